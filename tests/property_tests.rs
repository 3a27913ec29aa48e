use std::sync::Arc;

use proptest::prelude::*;
use rowgraph::flags::{BitLayout, FieldSchema, FlagSet, FlagValue};
use rowgraph::schema::{NodeSchema, Registry};
use rowgraph::{Cursor, Db, DbOptions, MemoryStore, Node, RowGraphError, Value, ValueKind};

#[derive(Clone, Debug)]
enum Shape {
    Bool,
    Int(u16),
    Enum(usize),
}

impl Shape {
    fn schema(&self) -> FieldSchema {
        match self {
            Shape::Bool => FieldSchema::bool(false),
            Shape::Int(max) => FieldSchema::int(*max),
            Shape::Enum(n) => {
                FieldSchema::enumeration((0..*n).map(|i| format!("v{i}"))).unwrap()
            }
        }
    }

    fn value(&self, seed: u16) -> FlagValue {
        match self {
            Shape::Bool => FlagValue::Bool(seed % 2 == 1),
            Shape::Int(max) => FlagValue::Int(seed % (max + 1)),
            Shape::Enum(n) => FlagValue::Enum(format!("v{}", seed as usize % n)),
        }
    }
}

fn shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        Just(Shape::Bool),
        (1u16..=200).prop_map(Shape::Int),
        (1usize..=9).prop_map(Shape::Enum),
    ]
}

/// Allocates shapes in order until one no longer fits.
fn layout_of(shapes: &[Shape]) -> (Arc<BitLayout>, usize) {
    let mut layout = BitLayout::new();
    let mut fitted = 0;
    for (i, shape) in shapes.iter().enumerate() {
        if layout.allocate(format!("f{i}"), shape.schema()).is_err() {
            break;
        }
        fitted += 1;
    }
    layout.freeze();
    (Arc::new(layout), fitted)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn flag_values_survive_the_raw_word(
        fields in proptest::collection::vec((shape(), any::<u16>()), 1..12)
    ) {
        let shapes: Vec<Shape> = fields.iter().map(|(shape, _)| shape.clone()).collect();
        let (layout, fitted) = layout_of(&shapes);
        let mut flags = layout.flags();
        for (i, (shape, seed)) in fields.iter().take(fitted).enumerate() {
            flags.set(&format!("f{i}"), shape.value(*seed)).unwrap();
        }
        let reloaded = FlagSet::from_raw(Arc::clone(&layout), flags.raw());
        for (i, (shape, seed)) in fields.iter().take(fitted).enumerate() {
            prop_assert_eq!(reloaded.get(&format!("f{i}")).unwrap(), shape.value(*seed));
        }
        prop_assert_eq!(flags.raw() & !layout.used_mask(), 0);
    }

    #[test]
    fn diff_partitions_the_dirty_bits(
        fields in proptest::collection::vec((shape(), any::<u16>()), 1..12),
        initial in any::<u16>(),
        touched in proptest::collection::vec(any::<bool>(), 12),
    ) {
        let shapes: Vec<Shape> = fields.iter().map(|(shape, _)| shape.clone()).collect();
        let (layout, fitted) = layout_of(&shapes);
        let mut flags = FlagSet::from_raw(Arc::clone(&layout), initial & layout.used_mask());
        for (i, (shape, seed)) in fields.iter().take(fitted).enumerate() {
            if touched[i] {
                flags.set(&format!("f{i}"), shape.value(*seed)).unwrap();
            }
        }
        let diff = flags.diff();
        let mut covered = 0u16;
        for &bit in &diff.add {
            prop_assert!(flags.raw() & (1 << bit) != 0);
            covered |= 1 << bit;
        }
        for &bit in &diff.clear {
            prop_assert!(flags.raw() & (1 << bit) == 0);
            prop_assert!(covered & (1 << bit) == 0);
            covered |= 1 << bit;
        }
        prop_assert_eq!(covered, flags.dirty_mask());
        prop_assert_eq!(diff.is_empty(), !flags.is_dirty());
    }

    #[test]
    fn layout_never_exceeds_word(shapes in proptest::collection::vec(shape(), 1..24)) {
        let mut layout = BitLayout::new();
        for (i, shape) in shapes.iter().enumerate() {
            let before = (layout.bits_used(), layout.len());
            let width = shape.schema().bit_width();
            match layout.allocate(format!("f{i}"), shape.schema()) {
                Ok(()) => prop_assert_eq!(layout.bits_used(), before.0 + width),
                Err(RowGraphError::LayoutOverflow { .. }) => {
                    prop_assert!(before.0 as u16 + width as u16 > 16);
                    prop_assert_eq!((layout.bits_used(), layout.len()), before);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
            prop_assert!(layout.bits_used() <= 16);
        }
    }

    #[test]
    fn pagination_returns_every_row_once(count in 0usize..40, page in 1usize..10) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (values, calls) = runtime.block_on(async {
            let mut registry = Registry::new();
            let folder = NodeSchema::new("Folder").build(&mut registry).unwrap();
            let file = NodeSchema::new("File")
                .value(ValueKind::Int)
                .build(&mut registry)
                .unwrap();
            let store = Arc::new(MemoryStore::new());
            let db = Db::new(store.clone(), registry.finish().unwrap(), DbOptions::default())
                .unwrap();
            let root = Node::create(&db, &folder, Value::Null, None, None).await.unwrap();
            for i in 0..count {
                Node::create(&db, &file, i as i64, Some(root.guid()), None)
                    .await
                    .unwrap();
            }
            store.reset_calls();
            let rows = root
                .children(&db, &file, Cursor::new(0, page))
                .unwrap()
                .try_collect()
                .await
                .unwrap();
            let values: Vec<i64> = rows.iter().filter_map(|n| n.value().as_int()).collect();
            (values, store.call_count("list"))
        });
        prop_assert_eq!(values, (0..count as i64).collect::<Vec<_>>());
        prop_assert_eq!(calls, (count / page + 1) as u64);
    }
}
