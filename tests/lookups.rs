mod common;

use rowgraph::schema::{NameSchema, NodeSchema, Registry};
use rowgraph::store::SearchMode;
use rowgraph::{Alias, Db, DbOptions, MemoryStore, Node, Result, RowGraphError, Value};
use std::sync::Arc;

use common::{fixture, Fixture};

async fn user(fx: &Fixture) -> Result<Node> {
    Node::create(&fx.db, &fx.user, Value::Null, None, None).await
}

#[tokio::test]
async fn alias_is_unique_per_context() -> Result<()> {
    let fx = fixture();
    let (ann, bob) = (user(&fx).await?, user(&fx).await?);
    let anns = fx.handle.of(&ann)?;
    let bobs = fx.handle.of(&bob)?;

    assert!(anns.add(&fx.db, "ann").await?);
    assert!(!anns.add(&fx.db, "ann").await?);
    let err = bobs.add(&fx.db, "ann").await.unwrap_err();
    assert!(matches!(err, RowGraphError::AliasInUse { .. }));

    let owner = Alias::lookup_owner(&fx.db, &fx.handle, "ann", None).await?.unwrap();
    assert_eq!(owner.guid(), ann.guid());
    assert!(Alias::lookup(&fx.db, &fx.handle, "nobody", None).await?.is_none());

    assert!(anns.remove(&fx.db, "ann").await?);
    assert!(bobs.add(&fx.db, "ann").await?);
    let owner = Alias::lookup_owner(&fx.db, &fx.handle, "ann", None).await?.unwrap();
    assert_eq!(owner.guid(), bob.guid());
    Ok(())
}

#[tokio::test]
async fn alias_rename_goes_through_save() -> Result<()> {
    let fx = fixture();
    let (ann, bob) = (user(&fx).await?, user(&fx).await?);
    fx.handle.of(&ann)?.add(&fx.db, "ann").await?;
    fx.handle.of(&bob)?.add(&fx.db, "bob").await?;

    let mut alias = fx.handle.of(&ann)?.get(&fx.db, "ann").await?.unwrap();
    alias.rename("anna")?;
    alias.save(&fx.db).await?;
    assert_eq!(alias.text(), "anna");
    assert!(Alias::lookup(&fx.db, &fx.handle, "ann", None).await?.is_none());
    let found = Alias::lookup(&fx.db, &fx.handle, "anna", None).await?.unwrap();
    assert_eq!(found.owner(), ann.guid());

    alias.rename("bob")?;
    let err = alias.save(&fx.db).await.unwrap_err();
    assert!(matches!(err, RowGraphError::AliasInUse { .. }));
    assert_eq!(alias.old_value(), &Value::from("anna"));
    Ok(())
}

#[tokio::test]
async fn scoped_alias_is_unique_per_parent() -> Result<()> {
    let fx = fixture();
    let (ann, bob) = (user(&fx).await?, user(&fx).await?);
    let first = Node::create(&fx.db, &fx.doc, Value::Null, Some(ann.guid()), None).await?;
    let second = Node::create(&fx.db, &fx.doc, Value::Null, Some(bob.guid()), None).await?;

    assert!(fx.slug.of(&first)?.add(&fx.db, "intro").await?);
    assert!(fx.slug.of(&second)?.add(&fx.db, "intro").await?);

    let found = Alias::lookup(&fx.db, &fx.slug, "intro", Some(ann.guid())).await?.unwrap();
    assert_eq!(found.owner(), first.guid());
    assert_eq!(found.text(), "intro");
    assert_eq!(found.scope(), Some(ann.guid()));
    let owner = Alias::lookup_owner(&fx.db, &fx.slug, "intro", Some(bob.guid()))
        .await?
        .unwrap();
    assert_eq!(owner.guid(), second.guid());

    assert!(matches!(
        Alias::lookup(&fx.db, &fx.slug, "intro", None).await,
        Err(RowGraphError::InvalidArgument(_))
    ));
    let orphan = Node::create(&fx.db, &fx.doc, Value::Null, None, None).await?;
    assert!(matches!(
        fx.slug.of(&orphan),
        Err(RowGraphError::InvalidArgument(_))
    ));
    Ok(())
}

#[tokio::test]
async fn aliases_list_in_order_and_shift() -> Result<()> {
    let fx = fixture();
    let ann = user(&fx).await?;
    let aliases = fx.handle.of(&ann)?;
    for text in ["a", "b", "c"] {
        aliases.add(&fx.db, text).await?;
    }

    let last = aliases.nth(&fx.db, 2).await?.unwrap();
    assert_eq!(last.text(), "c");
    assert!(last.shift(&fx.db, 0).await?);

    let listed: Vec<String> = aliases
        .list(&fx.db, fx.db.cursor())?
        .try_collect()
        .await?
        .iter()
        .map(|alias| alias.text().to_owned())
        .collect();
    assert_eq!(listed, ["c", "a", "b"]);
    Ok(())
}

#[tokio::test]
async fn names_repeat_across_owners_and_search_by_prefix() -> Result<()> {
    let fx = fixture();
    let (ann, bob) = (user(&fx).await?, user(&fx).await?);
    let anns = fx.nick.of(ann.guid());
    let bobs = fx.nick.of(bob.guid());

    assert!(anns.add(&fx.db, "Al").await?);
    assert!(!anns.add(&fx.db, "Al").await?);
    assert!(anns.add(&fx.db, "Bert").await?);
    assert!(bobs.add(&fx.db, "Al").await?);
    assert!(bobs.add(&fx.db, "Alfie").await?);

    let listed: Vec<String> = anns
        .list(&fx.db, fx.db.cursor())?
        .try_collect()
        .await?
        .iter()
        .map(|name| name.text().to_owned())
        .collect();
    assert_eq!(listed, ["Al", "Bert"]);

    let hits = fx.nick.search(&fx.db, "Al", fx.db.cursor())?.try_collect().await?;
    let hits: Vec<_> = hits.iter().map(|n| (n.owner(), n.text().to_owned())).collect();
    assert_eq!(
        hits,
        vec![
            (ann.guid(), "Al".to_owned()),
            (bob.guid(), "Al".to_owned()),
            (bob.guid(), "Alfie".to_owned()),
        ]
    );

    assert!(anns.remove(&fx.db, "Al").await?);
    assert!(anns.get(&fx.db, "Al").await?.is_none());
    assert_eq!(anns.nth(&fx.db, 0).await?.unwrap().text(), "Bert");
    Ok(())
}

#[tokio::test]
async fn name_flags_and_order_are_saved() -> Result<()> {
    let fx = fixture();
    let ann = user(&fx).await?;
    let names = fx.nick.of(ann.guid());
    names.add(&fx.db, "Al").await?;
    names.add(&fx.db, "Ally").await?;

    let mut ally = names.get(&fx.db, "Ally").await?.unwrap();
    ally.flags_mut().set("preferred", true)?;
    ally.save_flags(&fx.db).await?;
    assert!(ally.shift(&fx.db, 0).await?);

    let first = names.nth(&fx.db, 0).await?.unwrap();
    assert_eq!(first.text(), "Ally");
    assert!(first.flags().get_bool("preferred")?);
    Ok(())
}

#[tokio::test]
async fn phonetic_search_is_unsupported_by_memory_store() -> Result<()> {
    let mut registry = Registry::new();
    let person = NodeSchema::new("Person").build(&mut registry)?;
    let sounds = NameSchema::new("Person.sounds", &person)
        .search(SearchMode::Phonetic)
        .build(&mut registry)?;
    let db = Db::new(
        Arc::new(MemoryStore::new()),
        registry.finish()?,
        DbOptions::default(),
    )?;

    let mut hits = sounds.search(&db, "smith", db.cursor())?;
    assert!(matches!(
        hits.next().await,
        Err(RowGraphError::Unsupported(_))
    ));
    Ok(())
}
