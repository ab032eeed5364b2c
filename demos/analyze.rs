use clap::Parser;

use octagon_rs::analysis::{Analysis, Verdict};
use octagon_rs::cfa::{BinaryOp, CType, Cfa, CfaBuilder, Declaration, EdgeKind, Expression, Statement};
use octagon_rs::options::OctagonOptions;
use octagon_rs::precision::FullPrecision;
use octagon_rs::state::OctagonState;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Loop bound.
    #[arg(value_name = "INT", default_value = "10")]
    bound: i64,

    /// Check `i == j` after the loop (otherwise `j < bound`, which fails).
    #[clap(long)]
    relational: bool,

    /// Join instead of widening at loop heads.
    #[clap(long)]
    no_widen: bool,

    /// Maximal number of worklist iterations.
    #[clap(long, value_name = "INT", default_value = "10000")]
    max_iterations: usize,

    /// Print debug output.
    #[clap(short, long)]
    verbose: bool,
}

fn assume(op: BinaryOp, left: Expression, right: Expression, truth: bool) -> EdgeKind {
    EdgeKind::Assume {
        expression: Expression::binary(op, left, right),
        truth,
    }
}

fn increment(name: &str) -> EdgeKind {
    EdgeKind::Statement(Statement::ExpressionAssignment {
        lhs: Expression::var(name),
        rhs: Expression::binary(BinaryOp::Add, Expression::var(name), Expression::int(1)),
    })
}

/// ```c
/// int i = 0, j = 0;
/// while (i < bound) { i++; j++; }
/// if (i != j) error();      // --relational
/// if (j < bound) error();   // otherwise
/// ```
fn build_program(bound: i64, relational: bool) -> Cfa {
    let mut b = CfaBuilder::new();
    let entry = b.node("main");
    let declared = b.node("main");
    let head = b.loop_start("main");
    let body = b.node("main");
    let body2 = b.node("main");
    let exit = b.node("main");
    let error = b.error_node("main");

    let int = |name: &str| EdgeKind::Declaration(Declaration::variable(name, CType::int(), false, Some(Expression::int(0))));
    let check = if relational {
        assume(BinaryOp::Ne, Expression::var("i"), Expression::var("j"), true)
    } else {
        assume(BinaryOp::Lt, Expression::var("j"), Expression::int(bound), true)
    };

    b.edge(entry, declared, int("i"))
        .edge(declared, head, int("j"))
        .edge(head, body, assume(BinaryOp::Lt, Expression::var("i"), Expression::int(bound), true))
        .edge(body, body2, increment("i"))
        .edge(body2, head, increment("j"))
        .edge(head, exit, assume(BinaryOp::Lt, Expression::var("i"), Expression::int(bound), false))
        .edge(exit, error, check);
    b.build(entry)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        if args.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();
    println!("args = {:?}", args);

    let cfa = build_program(args.bound, args.relational);
    for edge in cfa.edges() {
        println!("  {}", edge);
    }

    let options = OctagonOptions::default()
        .with_widen_at_loop_heads(!args.no_widen)
        .with_max_iterations(args.max_iterations);
    let analysis = Analysis::new(options);
    let result = analysis.run(&cfa, OctagonState::new(), &FullPrecision)?;

    let mut locations: Vec<_> = result.reached.keys().copied().collect();
    locations.sort();
    for node in locations {
        if let Some(state) = result.state_at(node) {
            println!("{}: {}", node, state);
        }
    }

    println!("Verdict: {} after {} iterations", result.verdict, result.iterations);
    if let Verdict::Unsafe { location } = result.verdict {
        println!("Error location {} is reachable", location);
    }

    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
