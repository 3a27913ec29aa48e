mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rowgraph::db::CounterMetrics;
use rowgraph::rows::RowState;
use rowgraph::schema::{NodeSchema, Registry};
use rowgraph::{
    Db, DbOptions, Lock, MemoryStore, Node, Prop, Result, RowGraphError, Value, ValueKind,
};
use serde_json::json;

use common::{fixture, fixture_with};

#[tokio::test]
async fn save_rebinds_old_value() -> Result<()> {
    let fx = fixture();
    let mut node = Node::create(&fx.db, &fx.user, json!({"n": 1}), None, None).await?;
    assert_eq!(node.state(), RowState::Clean);

    node.set_value(json!({"n": 2}))?;
    assert_eq!(node.state(), RowState::Dirty);
    node.save(&fx.db).await?;
    assert_eq!(node.old_value(), &Value::from(json!({"n": 2})));
    assert_eq!(node.state(), RowState::Clean);

    node.set_value(json!({"n": 3}))?;
    node.save(&fx.db).await?;
    let fetched = Node::get(&fx.db, &fx.user, node.guid()).await?.unwrap();
    assert_eq!(fetched.value(), &Value::from(json!({"n": 3})));
    Ok(())
}

#[tokio::test]
async fn stale_save_leaves_local_state_untouched() -> Result<()> {
    let fx = fixture();
    let created = Node::create(&fx.db, &fx.user, json!({"n": 1}), None, None).await?;
    let mut mine = Node::get(&fx.db, &fx.user, created.guid()).await?.unwrap();
    let mut theirs = Node::get(&fx.db, &fx.user, created.guid()).await?.unwrap();

    theirs.set_value(json!({"n": 2}))?;
    theirs.save(&fx.db).await?;

    mine.set_value(json!({"n": 3}))?;
    mine.flags_mut().set("verified", true)?;
    let err = mine.save(&fx.db).await.unwrap_err();
    assert!(err.is_stale());
    assert_eq!(mine.value(), &Value::from(json!({"n": 3})));
    assert_eq!(mine.old_value(), &Value::from(json!({"n": 1})));
    assert!(mine.flags().is_dirty());

    mine.save_with(&fx.db, true).await?;
    assert!(!mine.flags().is_dirty());
    let fetched = Node::get(&fx.db, &fx.user, created.guid()).await?.unwrap();
    assert_eq!(fetched.value(), &Value::from(json!({"n": 3})));
    assert!(fetched.flags().get_bool("verified")?);
    Ok(())
}

#[tokio::test]
async fn refresh_recovers_from_stale() -> Result<()> {
    let fx = fixture();
    let created = Node::create(&fx.db, &fx.user, json!(1), None, None).await?;
    let mut mine = Node::get(&fx.db, &fx.user, created.guid()).await?.unwrap();
    let mut theirs = Node::get(&fx.db, &fx.user, created.guid()).await?.unwrap();
    theirs.set_value(json!(2))?;
    theirs.save(&fx.db).await?;

    mine.set_value(json!(3))?;
    assert!(mine.save(&fx.db).await.is_err());
    mine.refresh(&fx.db).await?;
    assert_eq!(mine.value(), &Value::from(json!(2)));
    mine.set_value(json!(3))?;
    mine.save(&fx.db).await?;
    Ok(())
}

#[tokio::test]
async fn forced_save_of_removed_row_is_not_found() -> Result<()> {
    let fx = fixture();
    let mut node = Node::create(&fx.db, &fx.user, json!(1), None, None).await?;
    let mut copy = Node::get(&fx.db, &fx.user, node.guid()).await?.unwrap();
    node.remove(&fx.db).await?;

    copy.set_value(json!(2))?;
    let err = copy.save_with(&fx.db, true).await.unwrap_err();
    assert!(matches!(err, RowGraphError::RowNotFound { .. }));
    let err = copy.save(&fx.db).await.unwrap_err();
    assert!(matches!(err, RowGraphError::RowNotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn forced_save_after_own_remove_is_not_found() -> Result<()> {
    let fx = fixture();
    let mut node = Node::create(&fx.db, &fx.user, json!(1), None, None).await?;
    assert!(node.remove(&fx.db).await?);

    node.set_value(json!(2))?;
    let err = node.save_with(&fx.db, true).await.unwrap_err();
    assert!(matches!(err, RowGraphError::RowNotFound { .. }));
    let err = node.save(&fx.db).await.unwrap_err();
    assert!(matches!(err, RowGraphError::RowNotFound { .. }));
    assert!(Node::get(&fx.db, &fx.user, node.guid()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn removed_prop_is_recreated_by_save() -> Result<()> {
    let fx = fixture();
    let user = Node::create(&fx.db, &fx.user, Value::Null, None, None).await?;
    let mut visits = Prop::get(&fx.db, &fx.counter, user.guid()).await?;
    visits.set_value(4i64)?;
    visits.save(&fx.db).await?;
    assert!(visits.remove(&fx.db).await?);

    visits.save(&fx.db).await?;
    let fetched = Prop::get(&fx.db, &fx.counter, user.guid()).await?;
    assert_eq!(fetched.value(), &Value::Int(4));
    Ok(())
}

#[tokio::test]
async fn float_row_holding_nan_saves_without_conflict() -> Result<()> {
    let mut registry = Registry::new();
    let reading = NodeSchema::new("Reading")
        .value(ValueKind::Float)
        .build(&mut registry)?;
    let db = Db::new(
        Arc::new(MemoryStore::new()),
        registry.finish()?,
        DbOptions::default(),
    )?;

    let mut node = Node::create(&db, &reading, f64::NAN, None, None).await?;
    assert_eq!(node.state(), RowState::Clean);
    node.set_value(1.0)?;
    node.save(&db).await?;
    let fetched = Node::get(&db, &reading, node.guid()).await?.unwrap();
    assert_eq!(fetched.value(), &Value::Float(1.0));
    Ok(())
}

#[tokio::test]
async fn value_kind_is_checked_locally() -> Result<()> {
    let fx = fixture();
    let mut visits = Prop::get(&fx.db, &fx.counter, rowgraph::Guid(1)).await?;
    assert!(matches!(
        visits.set_value("many"),
        Err(RowGraphError::InvalidArgument(_))
    ));
    Ok(())
}

#[tokio::test]
async fn prop_first_save_creates_then_compares() -> Result<()> {
    let fx = fixture();
    let user = Node::create(&fx.db, &fx.user, Value::Null, None, None).await?;
    let mut first = Prop::get(&fx.db, &fx.profile, user.guid()).await?;
    let mut second = Prop::get(&fx.db, &fx.profile, user.guid()).await?;
    assert_eq!(first.state(), RowState::New);
    assert!(first.flags().get_bool("public")?);

    first.set_value(json!({"bio": "first"}))?;
    first.flags_mut().set("public", false)?;
    first.save(&fx.db).await?;
    assert!(first.is_persisted());

    second.set_value(json!({"bio": "second"}))?;
    let err = second.save(&fx.db).await.unwrap_err();
    assert!(err.is_stale());
    second.save_with(&fx.db, true).await?;

    let fetched = Prop::get(&fx.db, &fx.profile, user.guid()).await?;
    assert_eq!(fetched.value(), &Value::from(json!({"bio": "second"})));
    assert!(!fetched.flags().get_bool("public")?);
    Ok(())
}

#[tokio::test]
async fn increment_respects_limit_and_kind() -> Result<()> {
    let fx = fixture();
    let user = Node::create(&fx.db, &fx.user, Value::Null, None, None).await?;
    let mut visits = Prop::get(&fx.db, &fx.counter, user.guid()).await?;
    visits.save(&fx.db).await?;

    assert_eq!(visits.increment(&fx.db, 1, None).await?, Some(1));
    assert_eq!(visits.increment(&fx.db, 2, Some(3)).await?, Some(3));
    assert_eq!(visits.increment(&fx.db, 1, Some(3)).await?, None);
    assert_eq!(visits.value(), &Value::Int(3));
    assert_eq!(visits.increment(&fx.db, -3, Some(0)).await?, Some(0));
    assert_eq!(visits.increment(&fx.db, -1, Some(0)).await?, None);

    let mut profile = Prop::get(&fx.db, &fx.profile, user.guid()).await?;
    assert!(matches!(
        profile.increment(&fx.db, 1, None).await,
        Err(RowGraphError::NotNumeric(_))
    ));
    let mut node = user;
    assert!(matches!(
        node.increment(&fx.db, 1, None).await,
        Err(RowGraphError::NotNumeric(_))
    ));
    Ok(())
}

#[tokio::test]
async fn increment_of_missing_row_is_not_found() -> Result<()> {
    let fx = fixture();
    let mut visits = Prop::get(&fx.db, &fx.counter, rowgraph::Guid(99)).await?;
    assert!(matches!(
        visits.increment(&fx.db, 1, None).await,
        Err(RowGraphError::RowNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn lock_excludes_second_holder_until_released() -> Result<()> {
    let fx = fixture();
    let user = Node::create(&fx.db, &fx.user, Value::Null, None, None).await?;
    let mut first = Lock::new(&fx.mutex, user.guid())?;
    let mut second = Lock::new(&fx.mutex, user.guid())?;

    first
        .acquire(&fx.db, Duration::from_millis(100), Duration::from_millis(5))
        .await?;
    assert!(first.is_held());
    let err = second
        .acquire(&fx.db, Duration::from_millis(30), Duration::from_millis(5))
        .await
        .unwrap_err();
    assert!(matches!(err, RowGraphError::LockTimeout { .. }));

    first.release(&fx.db).await?;
    assert!(!first.is_held());
    second
        .acquire(&fx.db, Duration::from_millis(100), Duration::from_millis(5))
        .await?;
    Ok(())
}

#[tokio::test]
async fn lock_needs_integer_property() {
    let fx = fixture();
    assert!(matches!(
        Lock::new(&fx.profile, rowgraph::Guid(1)),
        Err(RowGraphError::NotNumeric(_))
    ));
}

#[tokio::test]
async fn conflicts_and_updates_are_counted() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let fx = fixture_with(MemoryStore::new(), DbOptions::default().metrics(metrics.clone()));
    let created = Node::create(&fx.db, &fx.user, json!(1), None, None).await?;
    let mut a = Node::get(&fx.db, &fx.user, created.guid()).await?.unwrap();
    let mut b = Node::get(&fx.db, &fx.user, created.guid()).await?.unwrap();
    a.set_value(json!(2))?;
    a.save(&fx.db).await?;
    b.set_value(json!(3))?;
    assert!(b.save(&fx.db).await.is_err());

    assert_eq!(metrics.rows_created.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.rows_updated.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.cas_conflicts.load(Ordering::Relaxed), 1);
    Ok(())
}
