/// corex CLI: a small demo harness that exercises the shape tree, BigInt
/// engine, deopt pipeline, and event loop end to end. Not part of the core
/// crate's contract (§6) — ambient tooling only.
use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use corex::deopt::{
    BailoutReason, DeoptManager, DeoptMetadata, DeoptMode, FrameShape, FunctionId, FunctionProto, JitState,
    OptimizedCode, SafePoint, ValueLocation,
};
use corex::{Attrs, BigInt, EventLoop, RuntimeConfig, ShapeTree, Value};

#[derive(ClapParser)]
#[command(
    name = "corex",
    version = "0.1.0",
    about = "Corten core substrate demo",
    long_about = "corex — exercises the shape tree, BigInt engine, deopt pipeline, and event loop."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a few shapes and print their transition/slot layout.
    Shapes,
    /// Evaluate a BigInt arithmetic expression: `<lhs> <op> <rhs>`, e.g. `17 / -5`.
    Bigint { lhs: String, op: String, rhs: String },
    /// Run a scripted eager and lazy deoptimization, printing reconstructed frames.
    Deopt,
    /// Run the microtask/macrotask ordering demo from the design notes.
    EventLoop,
    /// Print the active runtime configuration.
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Shapes => run_shapes(),
        Commands::Bigint { lhs, op, rhs } => run_bigint(&lhs, &op, &rhs),
        Commands::Deopt => run_deopt(),
        Commands::EventLoop => run_event_loop(),
        Commands::Config => run_config(),
    }
}

fn run_shapes() -> Result<()> {
    let config = RuntimeConfig::load();
    let tree = ShapeTree::new(config.shape_flatten_threshold);
    let root = tree.root();
    let a = tree.child(&root, "x", Attrs::DEFAULT);
    let b = tree.child(&a, "y", Attrs::DEFAULT);
    let c = tree.child(&a, "y", Attrs::DEFAULT);
    println!("root -> x -> y shape id: {:?}", b.id());
    println!("structurally shared with repeated transition: {}", b == c);
    println!("slot(x) = {:?}, slot(y) = {:?}", tree.slot(&b, "x"), tree.slot(&b, "y"));
    Ok(())
}

fn run_bigint(lhs: &str, op: &str, rhs: &str) -> Result<()> {
    let a = BigInt::parse(lhs).with_context(|| format!("parsing lhs '{lhs}'"))?;
    let b = BigInt::parse(rhs).with_context(|| format!("parsing rhs '{rhs}'"))?;
    let result = match op {
        "+" => a.add(&b),
        "-" => a.sub(&b),
        "*" => a.mul(&b),
        "/" => a.div(&b)?,
        "%" => a.rem(&b)?,
        "&" => a.and(&b),
        "|" => a.or(&b),
        "^" => a.xor(&b),
        other => anyhow::bail!("unsupported operator '{other}'"),
    };
    println!("{lhs} {op} {rhs} = {result}");
    Ok(())
}

fn run_deopt() -> Result<()> {
    let config = RuntimeConfig::load();
    let shapes = ShapeTree::new(config.shape_flatten_threshold);
    let objects = corex::ObjectArena::new();
    let manager = DeoptManager::with_hot_threshold(config.hot_deopt_threshold);

    let function = FunctionId(1);
    let proto = FunctionProto { id: function, name: "add_loop".into(), locals_count: 1 };
    let metadata = DeoptMetadata {
        bytecode_offset: 20,
        frame_shape: FrameShape { locals: vec![ValueLocation::Constant(Value::from_i32(41))], operand_stack: vec![] },
        inlined_frames: vec![],
        escaped_objects: vec![],
    };
    println!("bailout-point metadata:\n{}", serde_json::to_string_pretty(&metadata)?);
    let code = OptimizedCode::new(function).with_bailout_point(20, metadata);
    manager.track(proto.clone());
    manager.register(proto, code);

    let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
    if let Some(outcome) = manager.deoptimize(function, 20, BailoutReason::Overflow, DeoptMode::Eager, jit, &shapes, &objects)? {
        println!("eager deopt reconstructed {} frame(s), ip={}", outcome.frames.len(), outcome.frames[0].instruction_pointer);
    }
    println!("function state after eager deopt: {:?}", manager.state(function));

    // Re-register and run a lazy deopt to show the Invalidated -> Retired
    // path, drained at the next safe point.
    let proto = FunctionProto { id: function, name: "add_loop".into(), locals_count: 1 };
    let metadata = DeoptMetadata {
        bytecode_offset: 20,
        frame_shape: FrameShape { locals: vec![ValueLocation::Constant(Value::from_i32(41))], operand_stack: vec![] },
        inlined_frames: vec![],
        escaped_objects: vec![],
    };
    let code = OptimizedCode::new(function).with_bailout_point(20, metadata);
    manager.register(proto, code);
    let jit = JitState { registers: vec![], stack: vec![], constants: vec![] };
    manager.deoptimize(function, 20, BailoutReason::UncommonPath, DeoptMode::Lazy, jit, &shapes, &objects)?;
    println!("function state after lazy enqueue: {:?}", manager.state(function));
    let drained = manager.process_pending(SafePoint::LoopBackEdge, &shapes, &objects);
    println!("process_pending at a loop back-edge drained {} lazy deopt(s)", drained.len());
    println!("function state after drain: {:?}", manager.state(function));

    let stats = manager.stats();
    println!("deopt stats: total={}, by_site={:?}", stats.total, stats.by_site);
    let hot = manager.hot_deopts(config.hot_deopt_top_k)?;
    println!("top {} hot deopt site(s): {:?}", config.hot_deopt_top_k, hot);
    Ok(())
}

fn run_event_loop() -> Result<()> {
    let config = RuntimeConfig::load();
    let loop_ = EventLoop::with_drain_limit(config.microtask_drain_limit);
    loop_.queue_task(Box::new(|| println!("T1")));
    loop_.queue_microtask(Box::new(|| println!("M1")));
    loop_.queue_microtask(Box::new(|| println!("M2")));
    loop_.run();
    Ok(())
}

fn run_config() -> Result<()> {
    let config = RuntimeConfig::load();
    println!("{config:#?}");
    Ok(())
}
