#![allow(dead_code)]

use std::sync::Arc;

use rowgraph::flags::FieldSchema;
use rowgraph::schema::{
    AliasSchema, AliasType, NameSchema, NameType, NodeSchema, NodeType, PropSchema, PropType,
    Registry, RelationSchema, RelationType,
};
use rowgraph::{Db, DbOptions, MemoryStore, ValueKind};

pub struct Fixture {
    pub db: Db,
    pub store: Arc<MemoryStore>,
    pub user: NodeType,
    pub doc: NodeType,
    pub counter: PropType,
    pub profile: PropType,
    pub mutex: PropType,
    pub handle: AliasType,
    pub slug: AliasType,
    pub nick: NameType,
    pub owns: RelationType,
    pub follows: RelationType,
    pub friends: RelationType,
}

pub fn fixture() -> Fixture {
    fixture_with(MemoryStore::new(), DbOptions::default())
}

pub fn fixture_with(store: MemoryStore, opts: DbOptions) -> Fixture {
    let mut registry = Registry::new();
    let user = NodeSchema::new("User")
        .flag("verified", FieldSchema::bool(false))
        .flag("score", FieldSchema::int(5))
        .flag(
            "tier",
            FieldSchema::enumeration(["free", "pro", "team"]).unwrap(),
        )
        .build(&mut registry)
        .unwrap();
    let doc_ref = registry.forward("Doc");
    let owns = RelationSchema::new("User.owns", &user, doc_ref)
        .flag("pinned", FieldSchema::bool(false))
        .build(&mut registry)
        .unwrap();
    let doc = NodeSchema::new("Doc")
        .parent(&user)
        .flag("archived", FieldSchema::bool(false))
        .build(&mut registry)
        .unwrap();
    let follows = RelationSchema::new("User.follows", &user, &user)
        .build(&mut registry)
        .unwrap();
    let friends = RelationSchema::new("User.friends", &user, &user)
        .value(ValueKind::Str)
        .undirected()
        .build(&mut registry)
        .unwrap();
    let counter = PropSchema::new("User.visits", &user)
        .value(ValueKind::Int)
        .build(&mut registry)
        .unwrap();
    let profile = PropSchema::new("User.profile", &user)
        .flag("public", FieldSchema::bool(true))
        .build(&mut registry)
        .unwrap();
    let mutex = PropSchema::new("User.mutex", &user)
        .value(ValueKind::Int)
        .build(&mut registry)
        .unwrap();
    let handle = AliasSchema::new("User.handle", &user)
        .build(&mut registry)
        .unwrap();
    let slug = AliasSchema::new("Doc.slug", &doc)
        .scoped_to_parent()
        .build(&mut registry)
        .unwrap();
    let nick = NameSchema::new("User.nick", &user)
        .flag("preferred", FieldSchema::bool(false))
        .build(&mut registry)
        .unwrap();
    let schema = registry.finish().unwrap();
    let store = Arc::new(store);
    let db = Db::new(store.clone(), schema, opts).unwrap();
    Fixture {
        db,
        store,
        user,
        doc,
        counter,
        profile,
        mutex,
        handle,
        slug,
        nick,
        owns,
        follows,
        friends,
    }
}
