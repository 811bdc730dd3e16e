
use std::time::Instant;

use tracing;
use tracing_subscriber;
use clap::{self, Parser};

use sigmine::*;
use io::{read_transactions, read_labels, render_report, write_report, PrettyFormatter};
use model::MaxEntFormatter;

#[derive(Parser)]
#[command( about = "Mines statistically significant itemset patterns from binary transaction data" )]
struct Arguments {
    /// transactions to mine, FIMI format
    #[arg()]
    data_path: String,
    /// group labels, one integer per row
    #[arg( long )]
    labels: Option<String>,
    /// target error rate
    #[arg( long, default_value_t = 0.05 )]
    alpha: f64,
    /// control the family wise error rate (the default)
    #[arg( long, conflicts_with = "fdr" )]
    fwer: bool,
    /// control the false discovery rate with the LORD procedure
    #[arg( long )]
    fdr: bool,
    /// minimum absolute row count per pattern
    #[arg( long, default_value_t = 2 )]
    min_support: usize,
    /// cap on patterns per factor
    #[arg( long, default_value_t = 8 )]
    max_factor_size: usize,
    /// cap on singletons per factor
    #[arg( long, default_value_t = 50 )]
    max_factor_width: usize,
    /// node expansion budget
    #[arg( long )]
    max_expansions: Option<u64>,
    /// pattern count budget
    #[arg( long )]
    max_discoveries: Option<u64>,
    /// wall clock budget in seconds
    #[arg( long )]
    max_seconds: Option<f64>,
    /// Run with debug logging
    #[arg( long, default_value_t = false )]
    debug: bool,
    /// optional path to write the report to instead of standard output
    #[arg( long )]
    out: Option<String>,
}

fn setup_logging( args: &Arguments ) -> Result<(), String> {
    let tracer = tracing_subscriber::fmt::fmt();
    let tracer = if args.debug {
	tracer.with_max_level( tracing_subscriber::filter::LevelFilter::TRACE )
    } else {
	tracer.with_max_level( tracing_subscriber::filter::LevelFilter::INFO )
    };
    let tracer = tracer.with_writer( std::io::stderr ).finish();
    tracing::subscriber::set_global_default( tracer ).map_err( |err| err.to_string() )
}

fn build_options( args: &Arguments ) -> FitOptions {
    let mut options = FitOptions::default();
    options.alpha = args.alpha;
    options.min_support = args.min_support;
    options.max_factor_size = args.max_factor_size;
    options.max_factor_width = args.max_factor_width;
    if let Some( expansions ) = args.max_expansions {
	options.max_expansions = expansions;
    }
    if let Some( discoveries ) = args.max_discoveries {
	options.max_discoveries = discoveries;
    }
    if let Some( seconds ) = args.max_seconds {
	options.max_seconds = seconds;
    }
    options
}

fn main() -> Result<(), String> {
    let args = Arguments::parse();
    setup_logging( &args )?;

    let adjustment = match (args.fwer, args.fdr) {
	(false, true) => Adjustment::Fdr,
	_ => Adjustment::Fwer,
    };
    let options = build_options( &args );
    let transactions = read_transactions( &args.data_path )?;
    let data = DataView::from_transactions( &transactions );

    let started = Instant::now();
    let models = match &args.labels {
	Some( labels_path ) => {
	    let labels = read_labels( labels_path )?;
	    fit_grouped( adjustment, &data, &labels, &options )?
	},
	None => vec!( fit( adjustment, &data, &options )? ),
    };
    let execution_seconds = started.elapsed().as_secs_f64();

    let mut formatter = MaxEntFormatter::new();
    formatter.show_factors();
    for model in &models {
	tracing::debug!( "{}", formatter.format_pretty( model ));
    }

    let report = render_report( &models, execution_seconds )?;
    write_report( &report, args.out.as_deref() )
}
