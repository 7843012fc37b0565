//! Drives a `ProcedureGraph` to completion (spec §4.5), grounded on the
//! teacher's worker-pool dispatch pattern, simplified to one dedicated
//! tokio task per dataflow node.
//!
//! Two deliberate simplifications over a true streaming engine (see
//! DESIGN.md): all of a node's incoming edges share one `mpsc`
//! mailbox (tagged with the sending parent's id) rather than a
//! dedicated channel per edge, and the watermark advances exactly
//! once — from the minimum time to the query's end bound — rather
//! than incrementally, since every `StorageReader` here is a finite
//! historical read rather than a live stream. Both keep per-producer
//! FIFO ordering and the same deferred-aggregation correctness the
//! kernels are written against; neither changes query results.
//!
//! Every node's loop races its next message (or, for a source, its
//! next stream item) against `ResultSink::aborted()`, so a consumer
//! calling `ResultStream::abort()` stops every task in the graph
//! instead of letting them run the query to completion regardless.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use query_core::{Allocator, Block, Result, Time, TriggerSpec, MIN_TIME};
use query_plan::procspec::{
    AggregateProcedureSpec, CovarianceProcedureSpec, DerivativeProcedureSpec,
    DifferenceProcedureSpec, FilterProcedureSpec, FirstLastProcedureSpec, FromProcedureSpec,
    GroupProcedureSpec, JoinProcedureSpec, LimitProcedureSpec, PercentileProcedureSpec,
    RangeProcedureSpec, SampleProcedureSpec, StateTrackingProcedureSpec, WindowProcedureSpec,
    YieldProcedureSpec,
};
use query_plan::{ProcedureGraph, ProcedureSpec};

use crate::dataset::Dataset;
use crate::dispatch::ConcurrencyLimiter;
use crate::kernel::aggregate::{
    AggregateTransformation, CountAggregator, MaxAggregator, MeanAggregator, MinAggregator,
    SampleStatsAggregator, StatKind, SumAggregator,
};
use crate::kernel::covariance::CovarianceTransformation;
use crate::kernel::derivative::DerivativeTransformation;
use crate::kernel::difference::DifferenceTransformation;
use crate::kernel::filter::FilterTransformation;
use crate::kernel::group::GroupTransformation;
use crate::kernel::join::JoinTransformation;
use crate::kernel::limit::LimitTransformation;
use crate::kernel::percentile::PercentileTransformation;
use crate::kernel::range::RangeTransformation;
use crate::kernel::selector::{FirstLastTransformation, SampleTransformation};
use crate::kernel::state_tracking::StateTrackingTransformation;
use crate::kernel::window::WindowTransformation;
use crate::kernel::yield_sink::YieldTransformation;
use crate::kernel::{Aggregator, Transformation};
use crate::result::ResultSink;
use crate::storage::StorageReader;

enum Message {
    Block(String, Block),
    Watermark(String, Time),
    Finished(String),
}

enum NodeRuntime {
    Regular(Box<dyn Transformation>),
    Join(JoinTransformation),
}

fn new_aggregator(method: &str) -> Box<dyn Aggregator> {
    match method {
        "sum" => Box::new(SumAggregator::default()),
        "count" => Box::new(CountAggregator::default()),
        "mean" => Box::new(MeanAggregator::default()),
        "min" => Box::new(MinAggregator::default()),
        "max" => Box::new(MaxAggregator::default()),
        "stddev" => Box::new(SampleStatsAggregator::new(StatKind::Stddev)),
        "spread" => Box::new(SampleStatsAggregator::new(StatKind::Spread)),
        "skew" => Box::new(SampleStatsAggregator::new(StatKind::Skew)),
        other => unreachable!("unknown aggregate method {other}"),
    }
}

fn downcast<T: 'static>(spec: &dyn ProcedureSpec, what: &str) -> &T {
    spec.as_any()
        .downcast_ref::<T>()
        .unwrap_or_else(|| panic!("{what}: procedure spec type mismatch"))
}

/// Builds the kernel for every node kind except `from` (the source,
/// driven directly by a `StorageReader`) and `join` (two-parent,
/// handled by [`NodeRuntime::Join`]).
fn build_transformation(spec: &dyn ProcedureSpec) -> Box<dyn Transformation> {
    match spec.kind() {
        "range" => {
            let r: &RangeProcedureSpec = downcast(spec, "range");
            Box::new(RangeTransformation::new(r.bounds))
        }
        "limit" => {
            let l: &LimitProcedureSpec = downcast(spec, "limit");
            Box::new(LimitTransformation::new(l.n, l.offset))
        }
        "group" => {
            let g: &GroupProcedureSpec = downcast(spec, "group");
            Box::new(GroupTransformation::new(g.by.clone()))
        }
        "filter" => {
            let f: &FilterProcedureSpec = downcast(spec, "filter");
            Box::new(FilterTransformation::new(f.predicate.clone()))
        }
        "sum" | "count" | "mean" | "min" | "max" | "stddev" | "spread" | "skew" => {
            let a: &AggregateProcedureSpec = downcast(spec, "aggregate");
            let method = a.method.to_string();
            Box::new(AggregateTransformation::new(move || new_aggregator(&method)))
        }
        "first" => {
            let _: &FirstLastProcedureSpec = downcast(spec, "first");
            Box::new(FirstLastTransformation::first())
        }
        "last" => {
            let _: &FirstLastProcedureSpec = downcast(spec, "last");
            Box::new(FirstLastTransformation::last())
        }
        "sample" => {
            let s: &SampleProcedureSpec = downcast(spec, "sample");
            Box::new(SampleTransformation::new(s.n, s.pos))
        }
        "percentile" => {
            let p: &PercentileProcedureSpec = downcast(spec, "percentile");
            Box::new(PercentileTransformation::new(p.percentile, p.exact))
        }
        "derivative" => {
            let d: &DerivativeProcedureSpec = downcast(spec, "derivative");
            Box::new(DerivativeTransformation::new(d.unit, d.non_negative))
        }
        "difference" => {
            let d: &DifferenceProcedureSpec = downcast(spec, "difference");
            Box::new(DifferenceTransformation::new(d.non_negative))
        }
        "covariance" => {
            let c: &CovarianceProcedureSpec = downcast(spec, "covariance");
            Box::new(CovarianceTransformation::new(c.pearsonr))
        }
        "window" => {
            let w: &WindowProcedureSpec = downcast(spec, "window");
            Box::new(WindowTransformation::new(w.every, w.period, w.start.unwrap_or(MIN_TIME)))
        }
        "stateTracking" => {
            let s: &StateTrackingProcedureSpec = downcast(spec, "stateTracking");
            Box::new(StateTrackingTransformation::new(
                s.predicate.clone(),
                s.count_label.clone(),
                s.duration_label.clone(),
                s.duration_unit,
            ))
        }
        "yield" => {
            let y: &YieldProcedureSpec = downcast(spec, "yield");
            Box::new(YieldTransformation::new(y.name.clone()))
        }
        other => unreachable!("no runtime kernel registered for procedure kind {other}"),
    }
}

/// Runs `graph` to completion against `storage`, sending every `yield`
/// output to `sink`. Returns once every node has finished and the sink
/// side of the channel has been dropped, signaling end-of-results to
/// the consumer.
pub async fn execute(
    graph: &ProcedureGraph,
    storage: Arc<dyn StorageReader>,
    alloc: Arc<Allocator>,
    limiter: ConcurrencyLimiter,
    sink: ResultSink,
) -> Result<()> {
    let order = graph.topological_order();

    let mut senders: HashMap<String, mpsc::Sender<Message>> = HashMap::new();
    let mut receivers: HashMap<String, mpsc::Receiver<Message>> = HashMap::new();
    for id in &order {
        let (tx, rx) = mpsc::channel(crate::dispatch::MAILBOX_CAPACITY);
        senders.insert(id.clone(), tx);
        receivers.insert(id.clone(), rx);
    }

    let mut tasks = JoinSet::new();

    for id in order {
        let proc = graph.get(&id).expect("id came from topological_order");
        let parents = proc.parents.clone();
        let children: Vec<mpsc::Sender<Message>> =
            proc.children.iter().map(|c| senders[c].clone()).collect();
        let rx = receivers.remove(&id).expect("one receiver per node");
        let limiter = limiter.clone();
        let yield_name = (proc.spec.kind() == "yield").then(|| {
            let y: &YieldProcedureSpec = downcast(proc.spec.as_ref(), "yield");
            y.name.clone()
        });
        let sink = sink.clone();

        if proc.spec.kind() == "from" {
            let from: &FromProcedureSpec = downcast(proc.spec.as_ref(), "from");
            let bounds = from.bounds;
            let storage = storage.clone();
            let spec = from.clone();
            let id = id.clone();
            tasks.spawn(async move { run_source(id, spec, bounds, storage, children, sink).await });
            continue;
        }

        let alloc = alloc.clone();
        let runtime = if proc.spec.kind() == "join" {
            let j: &JoinProcedureSpec = downcast(proc.spec.as_ref(), "join");
            NodeRuntime::Join(JoinTransformation::new(j.on.clone()))
        } else {
            NodeRuntime::Regular(build_transformation(proc.spec.as_ref()))
        };

        tasks.spawn(async move {
            run_node(id, parents, rx, children, runtime, alloc, limiter, sink, yield_name).await
        });
    }

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(inner) => inner?,
            // A task panicking (or being cancelled by the runtime) is
            // reported through the same typed error the rest of the
            // engine already propagates, instead of aborting the process.
            Err(join_err) => return Err(query_core::QueryError::Panic(join_err.to_string())),
        }
    }
    Ok(())
}

async fn run_source(
    id: String,
    spec: FromProcedureSpec,
    bounds: query_core::Bounds,
    storage: Arc<dyn StorageReader>,
    children: Vec<mpsc::Sender<Message>>,
    sink: ResultSink,
) -> Result<()> {
    use futures::StreamExt;
    let mut stream = storage.read(&spec).await?;
    loop {
        let block = tokio::select! {
            biased;
            _ = sink.aborted() => return Err(query_core::QueryError::Cancelled),
            next = stream.next() => next,
        };
        let Some(block) = block else { break };
        for child in children.iter() {
            let _ = child.send(Message::Block(id.clone(), block.clone())).await;
        }
    }
    let mark = if bounds.stop > MIN_TIME { bounds.stop } else { Time(i64::MAX) };
    for child in children.iter() {
        let _ = child.send(Message::Watermark(id.clone(), mark)).await;
        let _ = child.send(Message::Finished(id.clone())).await;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_node(
    id: String,
    parents: Vec<String>,
    mut rx: mpsc::Receiver<Message>,
    children: Vec<mpsc::Sender<Message>>,
    mut runtime: NodeRuntime,
    alloc: Arc<Allocator>,
    limiter: ConcurrencyLimiter,
    sink: ResultSink,
    yield_name: Option<String>,
) -> Result<()> {
    let mut dataset = Dataset::new(alloc, TriggerSpec::AfterWatermark);
    let left_parent = parents.first().cloned();
    let mut finished: std::collections::HashSet<String> = std::collections::HashSet::new();

    loop {
        let msg = tokio::select! {
            biased;
            _ = sink.aborted() => return Err(query_core::QueryError::Cancelled),
            msg = rx.recv() => msg,
        };
        let Some(msg) = msg else { break };
        match msg {
            Message::Block(parent, block) => {
                let _permit = limiter.acquire().await;
                match &mut runtime {
                    NodeRuntime::Regular(t) => t.process(&block, &mut dataset)?,
                    NodeRuntime::Join(j) => {
                        if Some(&parent) == left_parent.as_ref() {
                            j.process_left(&block, &mut dataset)?
                        } else {
                            j.process_right(&block, &mut dataset)?
                        }
                    }
                }
            }
            Message::Watermark(_parent, mark) => {
                match &mut runtime {
                    NodeRuntime::Regular(t) => t.update_watermark(mark, &mut dataset)?,
                    NodeRuntime::Join(j) => j.update_watermark(mark, &mut dataset)?,
                }
                let ready = dataset.advance_watermark(mark);
                emit(&id, ready, &children, &sink, yield_name.as_deref()).await;
            }
            Message::Finished(parent) => {
                finished.insert(parent);
                if finished.len() >= parents.len().max(1) {
                    match &mut runtime {
                        NodeRuntime::Regular(t) => t.finish(&mut dataset)?,
                        NodeRuntime::Join(j) => j.finish(&mut dataset)?,
                    }
                    let ready = dataset.drain_all();
                    emit(&id, ready, &children, &sink, yield_name.as_deref()).await;
                    for child in &children {
                        let _ = child.send(Message::Watermark(id.clone(), Time(i64::MAX))).await;
                        let _ = child.send(Message::Finished(id.clone())).await;
                    }
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn emit(
    id: &str,
    blocks: Vec<Block>,
    children: &[mpsc::Sender<Message>],
    sink: &ResultSink,
    yield_name: Option<&str>,
) {
    for block in blocks {
        if let Some(name) = yield_name {
            let _ = sink.send(name.to_string(), block.clone()).await;
        }
        for child in children {
            let _ = child.send(Message::Block(id.to_string(), block.clone())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use query_core::{Allocator, Bounds};
    use query_plan::{Procedure, ProcedureGraph, ProcedureSpec};
    use query_plan::procspec::{
        AggregateProcedureSpec, FromProcedureSpec, JoinProcedureSpec, LimitProcedureSpec,
        RangeProcedureSpec, YieldProcedureSpec,
    };

    use super::*;
    use crate::result::channel;
    use crate::storage::MemoryStorageReader;
    use crate::testutil::float_block;

    fn link(graph: &mut ProcedureGraph, id: &str, spec: Box<dyn ProcedureSpec>, parents: &[&str]) {
        for p in parents {
            graph.get_mut(p).unwrap().children.push(id.to_string());
        }
        graph.insert(Procedure {
            id: id.to_string(),
            spec,
            parents: parents.iter().map(|p| p.to_string()).collect(),
            children: Vec::new(),
            bounds: None,
        });
    }

    async fn run(
        graph: ProcedureGraph,
        storage: MemoryStorageReader,
    ) -> Vec<query_core::Block> {
        let (sink, mut stream) = channel();
        let alloc = Arc::new(Allocator::unlimited());
        let limiter = ConcurrencyLimiter::unbounded();
        execute(&graph, Arc::new(storage), alloc, limiter, sink).await.unwrap();
        let mut out = Vec::new();
        while let Some(yielded) = stream.recv().await {
            out.push(yielded.block);
        }
        out
    }

    #[tokio::test]
    async fn chain_of_three_nodes_propagates_only_in_range_rows() {
        let mut storage = MemoryStorageReader::new();
        storage.insert(
            "demo",
            vec![float_block(
                Bounds::new(Time(0), Time(100)),
                "a",
                &[(10, 1.0), (50, 2.0), (150, 3.0)],
            )],
        );

        let mut g = ProcedureGraph::new();
        link(&mut g, "src", Box::new(FromProcedureSpec::new("demo")), &[]);
        link(
            &mut g,
            "rng",
            Box::new(RangeProcedureSpec { bounds: Bounds::new(Time(0), Time(60)) }),
            &["src"],
        );
        link(&mut g, "out", Box::new(YieldProcedureSpec { name: "result".into() }), &["rng"]);

        let blocks = run(g, storage).await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].column(1).as_floats().unwrap(), &[1.0, 2.0]);
    }

    #[tokio::test]
    async fn aggregate_node_sums_all_rows_before_yielding() {
        let mut storage = MemoryStorageReader::new();
        storage.insert(
            "demo",
            vec![float_block(Bounds::new(Time(0), Time(10)), "a", &[(1, 1.0), (2, 2.0), (3, 3.0)])],
        );

        let mut g = ProcedureGraph::new();
        link(&mut g, "src", Box::new(FromProcedureSpec::new("demo")), &[]);
        link(&mut g, "sum", Box::new(AggregateProcedureSpec { kind: "sum", method: "sum" }), &["src"]);
        link(&mut g, "out", Box::new(YieldProcedureSpec { name: "result".into() }), &["sum"]);

        let blocks = run(g, storage).await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].column(1).as_floats().unwrap(), &[6.0]);
    }

    #[tokio::test]
    async fn limit_node_caps_rows_reaching_the_sink() {
        let mut storage = MemoryStorageReader::new();
        storage.insert(
            "demo",
            vec![float_block(
                Bounds::new(Time(0), Time(10)),
                "a",
                &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0), (5, 5.0)],
            )],
        );

        let mut g = ProcedureGraph::new();
        link(&mut g, "src", Box::new(FromProcedureSpec::new("demo")), &[]);
        link(&mut g, "lim", Box::new(LimitProcedureSpec { n: 2, offset: 0 }), &["src"]);
        link(&mut g, "out", Box::new(YieldProcedureSpec { name: "result".into() }), &["lim"]);

        let blocks = run(g, storage).await;
        let total_rows: usize = blocks.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total_rows, 2);
    }

    #[tokio::test]
    async fn join_combines_two_independent_source_branches() {
        let mut storage = MemoryStorageReader::new();
        let bounds = Bounds::new(Time(0), Time(10));
        storage.insert("left_db", vec![float_block(bounds, "a", &[(1, 10.0), (2, 20.0)])]);
        storage.insert("right_db", vec![float_block(bounds, "a", &[(1, 100.0), (3, 300.0)])]);

        let mut g = ProcedureGraph::new();
        link(&mut g, "left", Box::new(FromProcedureSpec::new("left_db")), &[]);
        link(&mut g, "right", Box::new(FromProcedureSpec::new("right_db")), &[]);
        link(&mut g, "joined", Box::new(JoinProcedureSpec { on: vec!["host".into()] }), &["left", "right"]);
        link(&mut g, "out", Box::new(YieldProcedureSpec { name: "result".into() }), &["joined"]);

        let blocks = run(g, storage).await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].num_rows(), 1);
        assert_eq!(blocks[0].times(), &[Time(1)]);
        assert_eq!(blocks[0].column(1).as_floats().unwrap(), &[10.0]);
        assert_eq!(blocks[0].column(2).as_floats().unwrap(), &[100.0]);
    }
}
