
use std::path::Path;
use std::fs::File;
use std::io::{BufReader, BufRead, Write};

use serde_json as json;

use crate::{Item, Itemvec};
use crate::model::MaxEnt;

/// Converts a structure into a string
pub trait PrettyFormatter<T> {
    fn format_pretty( &self, object: &T ) -> String;
}

/// Reads transactions in FIMI format: one row per line, set columns as
/// whitespace separated indices. Lines that fail to parse are skipped.
pub fn read_transactions( path: &str ) -> Result<Vec<Itemvec>, String> {
    let file = File::open( Path::new( path )).map_err( |e| e.to_string() )?;
    let reader = BufReader::new( file );
    let transactions = reader.lines()
	.filter_map( |line| line.ok() )
	.filter_map( |line| parse_transaction( &line ))
	.collect();
    Ok( transactions )
}

/// Parses whitespace separated column indices; None if any chunk is not a number.
pub fn parse_transaction( line: &str ) -> Option<Itemvec> {
    let mut items = Itemvec::new();
    for chunk in line.split_whitespace() {
	match Item::from_str_radix( chunk, 10 ) {
	    Ok( item ) => items.push( item ),
	    Err( _ ) => return None,
	}
    }
    Some( items )
}

/// Reads group labels, one integer per row. Unlike transactions, a malformed
/// line is an error because labels must stay aligned with the rows.
pub fn read_labels( path: &str ) -> Result<Vec<usize>, String> {
    let file = File::open( Path::new( path )).map_err( |e| e.to_string() )?;
    let reader = BufReader::new( file );
    let mut labels = Vec::new();
    for line in reader.lines() {
	let line = line.map_err( |e| e.to_string() )?;
	let label = line.trim().parse::<usize>()
	    .map_err( |_| format!( "invalid label line {:?}", line ))?;
	labels.push( label );
    }
    Ok( labels )
}

/// Renders the run report: the accepted patterns of every fitted model plus
/// the wall clock time of the fit. A single model reports a flat pattern list.
pub fn render_report( models: &[MaxEnt], execution_seconds: f64 ) -> Result<String, String> {
    let patterns = if models.len() == 1 {
	json::to_value( &models[0] )
    } else {
	json::to_value( models )
    }.map_err( |e| e.to_string() )?;

    let report = json::json!( {
	"patterns": patterns,
	"executiontime": execution_seconds,
    });
    json::to_string( &report ).map_err( |e| e.to_string() )
}

/// Writes the report to the given path, or to standard output without one.
pub fn write_report( report: &str, path: Option<&str> ) -> Result<(), String> {
    match path {
	Some( path ) => {
	    let mut file = File::create( Path::new( path )).map_err( |e| e.to_string() )?;
	    writeln!( file, "{}", report ).map_err( |e| e.to_string() )
	},
	None => {
	    println!( "{}", report );
	    Ok( () )
	},
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_parse_transaction() {
	assert_eq!( parse_transaction( "3 1 17" ), Some( vec!( 3, 1, 17 )));
	assert_eq!( parse_transaction( "" ), Some( Itemvec::new() ));
	assert_eq!( parse_transaction( "2 x 5" ), None );
    }

    #[test]
    fn test_render_report() {
	let mut model = MaxEnt::new( vec!( 0.5, 0.5 ), 8, 50 );
	assert!( model.insert_pattern( 0.5, &[0, 1] ));
	let report = render_report( &[model], 1.25 ).unwrap();
	assert!( report.contains( r#""patterns":[{"items":[0,1],"frequency":0.5}]"# ));
	assert!( report.contains( r#""executiontime":1.25"# ));
    }
}
