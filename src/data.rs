
use bit_set::BitSet;

use crate::{Count, Item, Itemvec, Rowset};

/// Row major view of a binary dataset: every row is the set of columns it contains,
/// every column knows the set of rows containing it.
#[derive( Debug, Clone )]
pub struct DataView {
    rows: Vec<BitSet>,
    singletons: Vec<Rowset>,
}

impl DataView {

    /// Builds the view from transactions given as vectors of column indices.
    /// The number of columns is inferred as the greatest index plus one.
    pub fn from_transactions<'a, T>( transactions: T ) -> DataView where
	T: IntoIterator<Item = &'a Itemvec>,
    {
	let mut rows: Vec<BitSet> = Vec::new();
	let mut num_columns = 0;
	for transaction in transactions {
	    let mut row = BitSet::new();
	    for item in transaction {
		row.insert( *item );
		num_columns = num_columns.max( *item + 1 );
	    }
	    rows.push( row );
	}

	let mut singletons = vec!( Rowset::new(); num_columns );
	for (row_index, row) in rows.iter().enumerate() {
	    for item in row.iter() {
		singletons[ item ].insert( row_index );
	    }
	}
	DataView{ rows, singletons }
    }

    pub fn num_rows( &self ) -> usize {
	self.rows.len()
    }

    pub fn num_columns( &self ) -> usize {
	self.singletons.len()
    }

    /// Iterates the set columns of the given row.
    pub fn row_items<'a>( &'a self, row: usize ) -> impl Iterator<Item = Item> + 'a {
	self.rows[ row ].iter()
    }

    /// Rows containing the given column.
    pub fn singleton_rows( &self, item: Item ) -> &Rowset {
	&self.singletons[ item ]
    }

    pub fn singletons( &self ) -> &[Rowset] {
	&self.singletons
    }

    /// Number of rows containing every column of the query.
    pub fn support( &self, query: &[Item] ) -> Count {
	match query.split_first() {
	    None => self.num_rows(),
	    Some( (first, rest) ) => {
		let mut rows = self.singletons[ *first ].clone();
		for item in rest {
		    rows.intersect_with( &self.singletons[ *item ] );
		}
		rows.len()
	    },
	}
    }

    /// Number of rows within the mask that contain the given column.
    pub fn masked_support( &self, item: Item, mask: &Rowset ) -> Count {
	self.singletons[ item ].intersection( mask ).count()
    }

    /// Mask covering every row of the dataset.
    pub fn full_mask( &self ) -> Rowset {
	(0 .. self.num_rows()).collect()
    }
}

/// Builds one row mask per unique label, masks ordered by ascending label.
pub fn group_masks( labels: &[usize] ) -> Vec<Rowset> {
    let mut unique: Vec<usize> = labels.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let mut masks = vec!( Rowset::new(); unique.len() );
    for (row, label) in labels.iter().enumerate() {
	let group = unique.binary_search( label ).expect( "every label is in the unique set" );
	masks[ group ].insert( row );
    }
    masks
}
