
use bit_set::BitSet;
use tracing::*;

use crate::{Item, Itemvec};

mod factor;
mod serialize;

pub use factor::{Factor, Inference};
pub use serialize::MaxEntFormatter;

/// Scratch buffers a worker owns while querying the model. Two set buffers for
/// factor bookkeeping plus one inference context; never shared between workers.
#[derive( Debug, Default )]
pub struct Scratch {
    /// factor indices touched by the current itemset
    factors_seen: BitSet,
    /// query positions local to one factor
    query: BitSet,
    inference: Inference,
}

impl Scratch {
    pub fn new() -> Scratch {
	Scratch::default()
    }
}

/// Maximum entropy null model factorized over a partition of the singletons.
///
/// Every factor owns a disjoint set of columns; the probability that an itemset
/// occurs in a random row is the product of the marginals of its per factor
/// fragments. Inserted patterns merge the factors they span, and merges are
/// refused once they would exceed the size or width caps.
#[derive( Debug, Clone )]
pub struct MaxEnt {
    factors: Vec<Factor>,
    /// column to factor index
    factor_of: Vec<usize>,
    /// empirical singleton frequencies
    freqs: Vec<f64>,
    max_size: usize,
    max_width: usize,
    /// accepted patterns in insertion order
    patterns: Vec<(Itemvec, f64)>,
}

impl MaxEnt {

    /// Builds the independence model: one width one factor per singleton.
    pub fn new( freqs: Vec<f64>, max_factor_size: usize, max_factor_width: usize ) -> MaxEnt {
	let factors: Vec<Factor> = freqs.iter().enumerate()
	    .map( |(item, freq)| Factor::new( vec!( item ), vec!( *freq )))
	    .collect();
	let factor_of = (0 .. freqs.len()).collect();
	MaxEnt{
	    factors,
	    factor_of,
	    freqs,
	    max_size: max_factor_size,
	    max_width: max_factor_width,
	    patterns: Vec::new(),
	}
    }

    pub fn num_singletons( &self ) -> usize {
	self.freqs.len()
    }

    pub fn num_factors( &self ) -> usize {
	self.factors.len()
    }

    /// Accepted patterns with their inserted empirical frequencies.
    pub fn patterns( &self ) -> &[(Itemvec, f64)] {
	&self.patterns
    }

    /// Width and size of every factor, for inspection.
    pub fn factor_shapes( &self ) -> Vec<(usize, usize)> {
	self.factors.iter().map( |factor| (factor.width(), factor.size()) ).collect()
    }

    /// Probability that the itemset is entirely on in a random row under the model.
    pub fn expectation( &self, items: &[Item], scratch: &mut Scratch ) -> f64 {
	let mut log_probability = 0.0;
	scratch.factors_seen.clear();
	for item in items {
	    let index = self.factor_of[ *item ];
	    if scratch.factors_seen.contains( index ) {
		continue;
	    }
	    scratch.factors_seen.insert( index );

	    let factor = &self.factors[ index ];
	    scratch.query.clear();
	    for covered in items {
		if let Some( position ) = factor.position( *covered ) {
		    scratch.query.insert( position );
		}
	    }
	    log_probability += factor.log_marginal( &scratch.query, &mut scratch.inference );
	}
	log_probability.exp().clamp( 0.0, 1.0 )
    }

    /// True iff inserting the itemset would push the merged covering factor
    /// beyond the size or width caps. Side effect free.
    pub fn is_forbidden( &self, items: &[Item], scratch: &mut Scratch ) -> bool {
	let mut width = 0;
	let mut size = 1; // the pattern itself
	scratch.factors_seen.clear();
	for item in items {
	    let index = self.factor_of[ *item ];
	    if scratch.factors_seen.contains( index ) {
		continue;
	    }
	    scratch.factors_seen.insert( index );
	    width += self.factors[ index ].width();
	    size += self.factors[ index ].size();
	}
	size > self.max_size || width > self.max_width
    }

    /// Merges all factors the itemset spans, folds the itemset in with its
    /// empirical frequency and refits the merged factor. Returns false and
    /// leaves the model untouched if the merge would violate the caps.
    pub fn insert_pattern( &mut self, freq: f64, items: &[Item] ) -> bool {
	let mut scratch = Scratch::new();
	if self.is_forbidden( items, &mut scratch ) {
	    return false;
	}

	let mut involved: Vec<usize> = items.iter().map( |item| self.factor_of[ *item ] ).collect();
	involved.sort_unstable();
	involved.dedup();

	// pool members and folded patterns of all involved factors
	let mut pooled: Vec<(Item, f64)> = Vec::new();
	let mut folded: Vec<(Itemvec, f64)> = Vec::new();
	for index in &involved {
	    let factor = &self.factors[ *index ];
	    pooled.extend( factor.members().iter().map( |item| (*item, self.freqs[ *item ]) ));
	    folded.extend( factor.patterns() );
	}
	pooled.sort_unstable_by_key( |entry| entry.0 );

	let members: Itemvec = pooled.iter().map( |entry| entry.0 ).collect();
	let targets: Vec<f64> = pooled.iter().map( |entry| entry.1 ).collect();
	let mut merged = Factor::new( members, targets );
	for (pattern, pattern_freq) in &folded {
	    merged.add_pattern( pattern, *pattern_freq );
	}
	merged.add_pattern( items, freq );
	merged.fit();

	// swap the merged factor in for the factors it absorbed
	let mut factors = Vec::with_capacity( self.factors.len() + 1 - involved.len() );
	for (index, factor) in self.factors.drain( .. ).enumerate() {
	    if involved.binary_search( &index ).is_err() {
		factors.push( factor );
	    }
	}
	factors.push( merged );
	self.factors = factors;
	for (index, factor) in self.factors.iter().enumerate() {
	    for item in factor.members() {
		self.factor_of[ *item ] = index;
	    }
	}

	debug!( "Inserted pattern {:?} with frequency {:.4}", items, freq );
	self.patterns.push( (items.to_vec(), freq) );
	true
    }
}
