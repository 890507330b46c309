use d2item::item::flag;
use d2item::{GameMode, Item, ItemError, ItemVersion, Quality, Registry};

fn registry() -> &'static Registry {
    Registry::builtin()
}

fn item(code: &str, version: ItemVersion) -> Item<'static> {
    Item::builder(code, registry())
        .version(version)
        .build()
        .unwrap()
}

fn reparse(item: &Item<'static>) -> Item<'static> {
    Item::from_bytes(&item.to_bytes(), item.version(), item.game_mode(), registry()).unwrap()
}

#[test]
fn test_edits_keep_offsets_consistent() {
    let mut cap = item("cap", ItemVersion::V110);
    cap.to_magic(1, 3).unwrap();
    cap.personalize("Kashya").unwrap();
    cap.set_socket_count(2).unwrap();
    cap.to_normal().unwrap();
    cap.unpersonalize().unwrap();

    let decoded = reparse(&cap);
    assert_eq!(decoded.offsets(), cap.offsets());
    assert_eq!(decoded.quality(), Quality::Normal);
    assert_eq!(decoded.personalized_name(), None);
    assert_eq!(decoded.total_sockets(), 2);
    assert!(decoded.has_flag(flag::SOCKETED));
}

#[test]
fn test_failed_runeword_leaves_item_intact() {
    let mut sword = item("lsd", ItemVersion::V110);
    sword.set_socket_count(2).unwrap();
    sword
        .add_socketed_item(item("r01", ItemVersion::V110))
        .unwrap();
    sword
        .add_socketed_item(item("r03", ItemVersion::V110))
        .unwrap();
    let before = sword.to_bytes();

    assert!(sword.apply_runeword().is_err());
    assert_eq!(sword.to_bytes(), before);
    assert!(!sword.is_runeword());
}

#[test]
fn test_runeword_apply_and_remove() -> anyhow::Result<()> {
    let mut sword = item("lsd", ItemVersion::V110);
    sword.set_socket_count(2)?;
    sword.add_socketed_item(item("r03", ItemVersion::V110))?;
    sword.add_socketed_item(item("r01", ItemVersion::V110))?;

    sword.apply_runeword()?;
    assert_eq!(sword.runeword_name(), Some("Steel"));
    let decoded = reparse(&sword);
    assert!(decoded.is_runeword());
    assert_eq!(decoded.runeword_attributes(), sword.runeword_attributes());

    sword.remove_runeword()?;
    assert!(!sword.is_runeword());
    assert_eq!(sword.filled_sockets(), 2);
    assert_eq!(reparse(&sword).offsets(), sword.offsets());
    Ok(())
}

#[test]
fn test_overlong_name_rejected() {
    let mut cap = item("cap", ItemVersion::V110);
    let before = cap.to_bytes();
    assert!(cap.personalize("ThisNameIsFarTooLongForTheGame").is_err());
    assert_eq!(cap.to_bytes(), before);
}

#[test]
fn test_upgrade_tier_and_durability() {
    let mut cap = item("cap", ItemVersion::V110);
    assert_eq!(cap.upgrade_tier().unwrap(), "xap");
    assert_eq!(cap.upgrade_tier().unwrap(), "uap");
    assert!(!cap.can_upgrade_tier());

    cap.make_indestructible().unwrap();
    assert!(cap.is_indestructible());
    let decoded = reparse(&cap);
    assert!(decoded.is_indestructible());
    assert_eq!(decoded.offsets(), cap.offsets());
}

#[test]
fn test_migration_across_families() -> anyhow::Result<()> {
    let mut cap = item("cap", ItemVersion::V109);
    cap.to_magic(1, 3)?;

    let resurrected = cap.convert(ItemVersion::V140, GameMode::Expansion)?;
    assert_eq!(resurrected.magic_attributes(), cap.magic_attributes());
    assert_eq!(resurrected.display_name(), cap.display_name());

    let back = resurrected.convert(ItemVersion::V109, GameMode::Expansion)?;
    assert_eq!(back.to_bytes(), cap.to_bytes());

    let shako = item("uap", ItemVersion::V110);
    assert!(matches!(
        shako.convert(ItemVersion::V109, GameMode::Classic),
        Err(ItemError::UnsupportedInVersion(..))
    ));
    Ok(())
}
