
use serde;
use serde::ser::{SerializeSeq, SerializeStruct};

use crate::Itemvec;
use crate::io::PrettyFormatter;

use super::MaxEnt;

/// Serializes the fitted model as its list of accepted patterns.
impl serde::Serialize for MaxEnt {
    fn serialize<S>( &self, serializer: S ) -> Result<S::Ok, S::Error> where S: serde::Serializer {
	let mut sequence = serializer.serialize_seq( Some( self.patterns().len() ))?;
	for (items, frequency) in self.patterns() {
	    sequence.serialize_element( &PatternEntry{ items, frequency: *frequency } )?;
	}
	sequence.end()
    }
}

struct PatternEntry<'a> {
    items: &'a Itemvec,
    frequency: f64,
}

impl<'a> serde::Serialize for PatternEntry<'a> {
    fn serialize<S>( &self, serializer: S ) -> Result<S::Ok, S::Error> where S: serde::Serializer {
	let mut entry = serializer.serialize_struct( "pattern", 2 )?;
	entry.serialize_field( "items", self.items )?;
	entry.serialize_field( "frequency", &self.frequency )?;
	entry.end()
    }
}

/// Renders the accepted patterns and the factor shapes for log output.
pub struct MaxEntFormatter {
    show_factors: bool,
}

impl PrettyFormatter<MaxEnt> for MaxEntFormatter {

    fn format_pretty( &self, model: &MaxEnt ) -> String {
	let mut output = String::new();
	output.push( '\n' ); // so output begins on a new line

	for (index, (items, frequency)) in model.patterns().iter().enumerate() {
	    output.push_str( &format_pattern( index, items, *frequency ));
	    output.push( '\n' );
	}
	if self.show_factors {
	    for (width, size) in model.factor_shapes() {
		if size > 0 {
		    output.push_str( &format!( "factor:  width {width}  size {size}" ));
		    output.push( '\n' );
		}
	    }
	}
	output
    }
}

impl MaxEntFormatter {
    pub fn new() -> MaxEntFormatter {
	MaxEntFormatter{ show_factors: false }
    }

    pub fn show_factors( &mut self ) { self.show_factors = true; }
}

fn format_pattern( index: usize, items: &Itemvec, frequency: f64 ) -> String {
    let rendered: Vec<String> = items.iter().map( |item| item.to_string() ).collect();
    format!( "{index}:  {frequency:.3} {}", rendered.join( " " ))
}
