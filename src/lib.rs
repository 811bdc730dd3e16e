
pub mod data;
pub mod binomial;
pub mod model;
pub mod lattice;
pub mod miner;
pub mod significance;
pub mod io;

pub use data::DataView;
pub use model::MaxEnt;
pub use miner::Miner;
pub use significance::{FwerControl, LordControl};

/// Column index of a binary feature
pub type Item = usize;
/// Used as intermediate representation for itemset patterns
pub type Itemvec = Vec<Item>;
/// Set of row indices
pub type Rowset = bit_set::BitSet;
/// Absolute row count
pub type Count = usize;

/// Hard cap on the number of patterns a single factor may ever hold.
pub const MAX_MAXENT_FACTOR_SIZE: usize = 12;

/// Multiple testing regime governing pattern admission.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Adjustment {
    /// family wise error rate, log adjusted Bonferroni threshold per layer
    Fwer,
    /// false discovery rate, sequential LORD procedure
    Fdr,
}

/// Tuning knobs of a mining run.
#[derive( Debug, Clone )]
pub struct FitOptions {
    /// target error rate, FWER alpha or FDR target
    pub alpha: f64,
    /// minimum absolute row count per pattern
    pub min_support: Count,
    /// cap on patterns per factor
    pub max_factor_size: usize,
    /// cap on singletons per factor
    pub max_factor_width: usize,
    /// node expansion budget
    pub max_expansions: u64,
    /// pattern count budget
    pub max_discoveries: u64,
    /// wall clock budget in seconds
    pub max_seconds: f64,
}

impl Default for FitOptions {
    fn default() -> FitOptions {
	FitOptions {
	    alpha: 0.05,
	    min_support: 2,
	    max_factor_size: 8,
	    max_factor_width: 50,
	    max_expansions: u64::MAX,
	    max_discoveries: u64::MAX,
	    max_seconds: f64::INFINITY,
	}
    }
}

impl FitOptions {
    /// Rejects parameter combinations the miner cannot honor.
    pub fn validate( &self ) -> Result<(), String> {
	if !( self.alpha > 0.0 && self.alpha <= 1.0 ) {
	    return Err( format!( "alpha must lie in (0, 1], got {}", self.alpha ));
	}
	if self.max_factor_size == 0 || self.max_factor_size > MAX_MAXENT_FACTOR_SIZE {
	    return Err( format!( "max_factor_size must lie in 1..={}, got {}", MAX_MAXENT_FACTOR_SIZE, self.max_factor_size ));
	}
	if self.max_factor_width == 0 {
	    return Err( "max_factor_width must be positive".to_string() );
	}
	if self.max_seconds.is_nan() || self.max_seconds < 0.0 {
	    return Err( format!( "max_seconds must be non negative, got {}", self.max_seconds ));
	}
	Ok( () )
    }
}

/// Mines the data as one population and returns the fitted null model.
pub fn fit( adjustment: Adjustment, data: &DataView, options: &FitOptions ) -> Result<MaxEnt, String> {
    options.validate()?;
    let mask = data.full_mask();
    let mut models = mine_groups( adjustment, data, &[mask], options );
    Ok( models.pop().expect( "one mask yields one model" ))
}

/// Mines the data stratified by group labels and returns one fitted model per group.
pub fn fit_grouped( adjustment: Adjustment, data: &DataView, labels: &[usize], options: &FitOptions ) -> Result<Vec<MaxEnt>, String> {
    options.validate()?;
    if labels.len() != data.num_rows() {
	return Err( format!( "expected {} labels, got {}", data.num_rows(), labels.len() ));
    }
    let masks = data::group_masks( labels );
    Ok( mine_groups( adjustment, data, &masks, options ))
}

fn mine_groups( adjustment: Adjustment, data: &DataView, masks: &[Rowset], options: &FitOptions ) -> Vec<MaxEnt> {
    let num_columns = data.num_columns();
    let mut models: Vec<MaxEnt> = masks.iter()
	.map( |mask| {
	    let group_size = mask.len();
	    let freqs: Vec<f64> = (0 .. num_columns)
		.map( |j| if group_size == 0 { 0.0 } else { data.masked_support( j, mask ) as f64 / group_size as f64 })
		.collect();
	    MaxEnt::new( freqs, options.max_factor_size, options.max_factor_width )
	}).collect();

    let lattice = lattice::Lattice::new( data.singletons().to_vec(), data.num_rows() );
    let miner = Miner::new( options.min_support, options.max_expansions, options.max_discoveries, options.max_seconds );
    match adjustment {
	Adjustment::Fwer => {
	    let mut control = FwerControl::new( options.alpha, num_columns );
	    miner.mine( &lattice, masks, &mut models, &mut control );
	},
	Adjustment::Fdr => {
	    let mut control = LordControl::new( options.alpha );
	    miner.mine( &lattice, masks, &mut models, &mut control );
	},
    }
    models
}
