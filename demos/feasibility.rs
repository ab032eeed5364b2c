use clap::Parser;

use octagon_rs::cfa::{BinaryOp, CType, CfaBuilder, CfaEdge, Declaration, EdgeKind, Expression, Statement};
use octagon_rs::feasibility::FeasibilityChecker;
use octagon_rs::options::OctagonOptions;
use octagon_rs::precision::RefineablePrecision;
use octagon_rs::state::OctagonState;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Initial value of `x`.
    #[arg(value_name = "INT", default_value = "0")]
    x: i64,

    /// Threshold checked on the error branch (`y > threshold`).
    #[clap(long, value_name = "INT", default_value = "2")]
    threshold: i64,
}

/// ```c
/// int x = <x>;
/// int y = x + 1;
/// int z = 7;
/// if (y > threshold) error();
/// ```
fn build_path(x: i64, threshold: i64) -> Vec<CfaEdge> {
    let edge = |kind| CfaBuilder::detached_edge("main", kind);
    let int = |name: &str, init: Expression| {
        EdgeKind::Declaration(Declaration::variable(name, CType::int(), false, Some(init)))
    };
    vec![
        edge(int("x", Expression::int(x))),
        edge(int("y", Expression::int(0))),
        edge(EdgeKind::Statement(Statement::ExpressionAssignment {
            lhs: Expression::var("y"),
            rhs: Expression::binary(BinaryOp::Add, Expression::var("x"), Expression::int(1)),
        })),
        edge(int("z", Expression::int(7))),
        edge(EdgeKind::Assume {
            expression: Expression::binary(BinaryOp::Gt, Expression::var("y"), Expression::int(threshold)),
            truth: true,
        }),
    ]
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    let path = build_path(args.x, args.threshold);
    for edge in &path {
        println!("  {}", edge);
    }

    let checker = FeasibilityChecker::new(OctagonOptions::default());
    let result = checker.check(&path, &OctagonState::new())?;

    if result.feasible {
        println!("Path is feasible");
        for state in &result.states {
            println!("  final state: {}", state);
        }
        return Ok(());
    }

    println!("Path is infeasible after {} edge(s)", result.prefix_len);
    if let Some(edge) = result.failing_edge(&path) {
        println!("  failing edge: {}", edge);
    }

    let precision = RefineablePrecision::default();
    let increment = checker.precision_increment(&path, &result, &precision);
    println!("Variables to track: {:?}", increment);
    let refined = precision.join(&increment);
    println!("Refined precision: {:?}", refined.tracked());

    Ok(())
}
