use d2item::items::{Items, Owner, Page};
use d2item::{
    GameMode, Item, ItemError, ItemVersion, MagicalAttribute, QualityBlock, RareAffixes, Registry,
};

fn registry() -> &'static Registry {
    Registry::builtin()
}

fn decode_again(item: &Item<'static>) -> Item<'static> {
    Item::from_bytes(&item.to_bytes(), item.version(), item.game_mode(), registry()).unwrap()
}

/// One record of every quality and stat encoding the builder can produce
fn samples(version: ItemVersion) -> Vec<Item<'static>> {
    let builder = |code: &str| Item::builder(code, registry()).version(version);
    let rare = RareAffixes::new(1, 4);
    let stats = vec![
        MagicalAttribute::new(0, vec![15]),
        MagicalAttribute::new(17, vec![30, 30]),
        MagicalAttribute::new(204, vec![13, 258, 9, 9]),
        MagicalAttribute::new(268, vec![1, 10, 300]),
    ];
    let builds = [
        builder("cap").build(),
        builder("cap").quality(QualityBlock::Inferior(1)).build(),
        builder("cap").quality(QualityBlock::Superior(0)).build(),
        builder("cap").magic(2, 3).build(),
        builder("cap").rare(rare.clone()).build(),
        builder("cap").crafted(rare.clone()).build(),
        builder("cap").unique(2).build(),
        builder("lsd").set(10).build(),
        builder("cap").rare(rare).personalized("Warriv").build(),
        builder("cap").magic(1, 3).attributes(stats).build(),
        builder("lsd").sockets(3).build(),
        builder("key").quantity(5).build(),
        builder("tbk").build(),
        builder("gcv").build(),
        set_with_bonuses(version),
    ];
    builds
        .into_iter()
        .map(|built| built.unwrap_or_else(|e| panic!("{}: {}", version, e)))
        .collect()
}

/// Set item carrying one active bonus list
fn set_with_bonuses(version: ItemVersion) -> d2item::Result<Item<'static>> {
    let mut fields = Item::builder("lsd", registry())
        .version(version)
        .set(10)
        .fields()?;
    if let Some(extended) = fields.extended.as_mut() {
        extended.set_bonus_mask = Some(1);
        extended.set_attributes = vec![vec![MagicalAttribute::new(19, vec![50])]];
    }
    Item::from_fields(&fields, version, GameMode::Expansion, registry())
}

#[test]
fn test_every_version_roundtrips() {
    for version in ItemVersion::ALL {
        for item in samples(version) {
            let decoded = decode_again(&item);
            let label = format!("{} {} {}", version, item.code(), item.quality());
            assert_eq!(decoded.to_bytes(), item.to_bytes(), "{}", label);
            assert_eq!(decoded.offsets(), item.offsets(), "{}", label);
            assert_eq!(decoded.quality_block(), item.quality_block(), "{}", label);
            assert_eq!(decoded.personalized_name(), item.personalized_name(), "{}", label);
            assert_eq!(decoded.set_attributes(), item.set_attributes(), "{}", label);
        }
    }
}

#[test]
fn test_convert_between_every_pair() {
    let mode = |version: ItemVersion| {
        if version.supports_expansion() {
            GameMode::Expansion
        } else {
            GameMode::Classic
        }
    };
    for from in ItemVersion::ALL {
        let item = Item::builder("cap", registry())
            .version(from)
            .mode(mode(from))
            .magic(1, 3)
            .personalized("Warriv")
            .build()
            .unwrap();
        for to in ItemVersion::ALL {
            let converted = item
                .convert(to, mode(to))
                .unwrap_or_else(|e| panic!("{} -> {}: {}", from, to, e));
            assert_eq!(converted.version(), to);
            assert_eq!(converted.magic_attributes(), item.magic_attributes(), "{} -> {}", from, to);
            assert_eq!(converted.personalized_name(), item.personalized_name());
            assert_eq!(decode_again(&converted).to_bytes(), converted.to_bytes());

            let back = converted.convert(from, mode(from)).unwrap();
            assert_eq!(back.to_bytes(), item.to_bytes(), "{} -> {} -> {}", from, to, from);
        }
    }
}

#[test]
fn test_socketed_children_follow_host() {
    let mut sword = Item::builder("lsd", registry())
        .version(ItemVersion::V110)
        .build()
        .unwrap();
    sword.set_socket_count(2).unwrap();
    sword
        .add_socketed_item(
            Item::builder("gcv", registry())
                .version(ItemVersion::V110)
                .build()
                .unwrap(),
        )
        .unwrap();

    let bytes = sword.to_bytes();
    assert_eq!(bytes.len(), sword.record_bytes().len() + sword.socketed_items()[0].to_bytes().len());
    let decoded = decode_again(&sword);
    assert_eq!(decoded.filled_sockets(), 1);
    assert_eq!(decoded.socketed_items()[0].code(), "gcv");
}

#[test]
fn test_truncated_input_is_malformed() {
    let cap = Item::builder("cap", registry())
        .version(ItemVersion::V110)
        .build()
        .unwrap();
    let bytes = cap.to_bytes();
    let error =
        Item::from_bytes(&bytes[..bytes.len() - 3], ItemVersion::V110, GameMode::Expansion, registry())
            .unwrap_err();
    assert!(error.is_malformed(), "{}", error);

    let error = Item::from_bytes(b"XX", ItemVersion::V110, GameMode::Expansion, registry())
        .unwrap_err();
    assert!(matches!(error, ItemError::BadMarker { .. }));
}

#[test]
fn test_collection_roundtrip() {
    let mut items = Items::new(ItemVersion::V110, GameMode::Expansion, registry());
    let cap = Item::builder("cap", registry())
        .version(ItemVersion::V110)
        .build()
        .unwrap();
    let sword = Item::builder("lsd", registry())
        .version(ItemVersion::V110)
        .build()
        .unwrap();
    items.place(cap, Page::Inventory, 0, 0).unwrap();
    items.auto_place(sword, Page::Stash).unwrap();
    let golem = Item::builder("lsd", registry())
        .version(ItemVersion::V110)
        .build()
        .unwrap();
    items.insert(golem, Owner::Golem).unwrap();

    let bytes = items.to_bytes().unwrap();
    let (decoded, used) =
        Items::read(&bytes, ItemVersion::V110, GameMode::Expansion, registry()).unwrap();
    assert_eq!(used, bytes.len());
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded.golem().map(|g| g.code()), Some("lsd"));
    assert_eq!(decoded.to_bytes().unwrap(), bytes);
}
