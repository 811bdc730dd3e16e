
use crate::{Count, Itemvec, Rowset};

/// A tentative pattern: itemset in ascending order, covered rows, support.
#[derive( Debug, Clone )]
pub struct Candidate {
    pub items: Itemvec,
    pub rows: Rowset,
    pub support: Count,
}

impl Candidate {
    fn new( items: Itemvec, rows: Rowset ) -> Candidate {
	let support = rows.len();
	Candidate{ items, rows, support }
    }

    pub fn len( &self ) -> usize {
	self.items.len()
    }
}

/// Prefix lattice over the itemset search space. Children of a node append a
/// singleton with index strictly greater than all of its items, so every
/// itemset is enumerated exactly once.
pub struct Lattice {
    singletons: Vec<Rowset>,
    num_rows: usize,
}

impl Lattice {

    pub fn new( singletons: Vec<Rowset>, num_rows: usize ) -> Lattice {
	Lattice{ singletons, num_rows }
    }

    pub fn num_rows( &self ) -> usize {
	self.num_rows
    }

    pub fn num_columns( &self ) -> usize {
	self.singletons.len()
    }

    /// The first lattice layer: one candidate per sufficiently supported singleton.
    pub fn roots( &self, min_support: Count ) -> Vec<Candidate> {
	self.singletons.iter().enumerate()
	    .filter( |(_, rows)| rows.len() >= min_support )
	    .map( |(item, rows)| Candidate::new( vec!( item ), rows.clone() ))
	    .collect()
    }

    /// Appends every child of the parent that clears the support threshold.
    /// Row sets shrink along an edge: child rows are the parent rows
    /// intersected with the rows of the appended singleton.
    pub fn expand( &self, parent: &Candidate, min_support: Count, children: &mut Vec<Candidate> ) {
	let first = parent.items.last().map_or( 0, |greatest| greatest + 1 );
	for item in first .. self.singletons.len() {
	    let mut rows = parent.rows.clone();
	    rows.intersect_with( &self.singletons[ item ] );
	    if rows.len() < min_support {
		continue;
	    }
	    let mut items = parent.items.clone();
	    items.push( item );
	    children.push( Candidate::new( items, rows ));
	}
    }
}
