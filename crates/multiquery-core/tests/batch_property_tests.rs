use multiquery_core::{
    BatchExecutor, Direction, ExecutorConfig, InMemoryGraph, Order, RelationCategory, Value,
    VertexId,
};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Shape {
    edges: Vec<(u64, u64, i64)>, // (from, to, weight)
    anchors: Vec<u64>,
    limit: usize,
    descending: bool,
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let edges = prop::collection::vec((0u64..6, 0u64..6, 0i64..10), 0..=24);
    let anchors = prop::collection::vec(0u64..8, 1..=8);
    (edges, anchors, 0usize..5, any::<bool>()).prop_map(|(edges, anchors, limit, descending)| {
        Shape {
            edges,
            anchors,
            limit,
            descending,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn anchors_evaluate_independently(shape in shape_strategy()) {
        let graph = Arc::new(InMemoryGraph::new());
        let knows = graph.define_label("knows");
        let weight = graph.define_key("weight");
        for (from, to, w) in &shape.edges {
            graph.add_edge_with(VertexId::new(*from), knows, VertexId::new(*to), [(weight, Value::Int(*w))]);
        }

        let config = ExecutorConfig { parallel_threshold: 3, ..ExecutorConfig::default() };
        let executor = BatchExecutor::from_graph(graph.clone(), config);
        let order = if shape.descending { Order::Desc } else { Order::Asc };
        let mut builder = executor.spec_builder();
        builder
            .direction(Direction::Out).unwrap()
            .order_by(weight, order).unwrap()
            .limit(shape.limit).unwrap();
        let spec = builder.freeze();

        let anchors: Vec<VertexId> = shape.anchors.iter().copied().map(VertexId::new).collect();
        let together = executor.execute(&anchors, &spec, RelationCategory::Edge).unwrap();

        for anchor in &anchors {
            let alone = executor.execute(&[*anchor], &spec, RelationCategory::Edge).unwrap();
            prop_assert_eq!(together.ready(*anchor), alone.ready(*anchor));

            // Naive reference: every outgoing edge, sorted, truncated.
            let mut expected: Vec<(i64, u64)> = graph_edges(&shape, anchor.raw());
            expected.sort_by(|a, b| match order {
                Order::Asc => a.0.cmp(&b.0),
                Order::Desc => b.0.cmp(&a.0),
            }.then(a.1.cmp(&b.1)));
            expected.truncate(shape.limit);

            let actual: Vec<(i64, u64)> = together
                .ready(*anchor)
                .unwrap()
                .iter()
                .map(|r| (r.attribute(weight).and_then(Value::as_i64).unwrap(), r.id.raw()))
                .collect();
            prop_assert_eq!(actual, expected);
        }
    }
}

/// `(weight, relation id)` for each outgoing edge of `anchor`. Relation ids
/// are assigned in insertion order starting at zero.
fn graph_edges(shape: &Shape, anchor: u64) -> Vec<(i64, u64)> {
    shape
        .edges
        .iter()
        .enumerate()
        .filter(|(_, (from, _, _))| *from == anchor)
        .map(|(id, (_, _, w))| (*w, id as u64))
        .collect()
}
