
use std::collections::VecDeque;
use std::time::Instant;

use rayon::prelude::*;
use tracing::*;

use crate::{Count, Rowset};
use crate::binomial::binomial_log_cdf;
use crate::lattice::{Candidate, Lattice};
use crate::model::{MaxEnt, Scratch};
use crate::significance::SignificanceControl;

/// Candidates scored per parallel batch; budgets are checked between batches.
const BATCH_SIZE: usize = 256;

/// Evaluation of one candidate against one group model.
#[derive( Debug, Clone )]
struct GroupScore {
    support: Count,
    frequency: f64,
    log_pvalue: f64,
    forbidden: bool,
}

/// A scored candidate awaiting report.
struct Work {
    candidate: Candidate,
    groups: Vec<GroupScore>,
    /// sum of threshold gated per group log p-value margins; 0 is ineligible
    score: f64,
    /// model generation the scores were computed against
    version: u64,
    /// forbidden in every group, so the whole subtree is dead
    blocked: bool,
}

/// Breadth first discoverer over the candidate lattice.
///
/// Layers are processed in batches ordered by support; batches are scored in
/// parallel against an immutable snapshot of the models, then reported
/// single threaded in score order. Reporting admits candidates through the
/// significance control and folds accepted patterns into the group models,
/// so candidates scored against a stale model generation are re-scored
/// before admission.
pub struct Miner {
    min_support: Count,
    max_expansions: u64,
    max_discoveries: u64,
    max_seconds: f64,
}

impl Miner {

    pub fn new( min_support: Count, max_expansions: u64, max_discoveries: u64, max_seconds: f64 ) -> Miner {
	Miner{ min_support, max_expansions, max_discoveries, max_seconds }
    }

    /// Mines patterns into the group models and returns the number of insertions.
    pub fn mine<C>( &self, lattice: &Lattice, masks: &[Rowset], models: &mut [MaxEnt], control: &mut C ) -> u64 where
	C: SignificanceControl,
    {
	let started = Instant::now();
	let group_sizes: Vec<Count> = masks.iter().map( |mask| mask.len() ).collect();
	let mut version: u64 = 0;
	let mut expansions: u64 = 0;
	let mut discoveries: u64 = 0;
	let mut scratch = Scratch::new();

	let mut frontier = lattice.roots( self.min_support );
	'mining: while !frontier.is_empty() {
	    // deterministic batch order: support descending, itemset ascending
	    frontier.sort_unstable_by( |left, right| {
		right.support.cmp( &left.support ).then_with( || left.items.cmp( &right.items ))
	    });
	    let mut layer: VecDeque<Candidate> = frontier.drain( .. ).collect();
	    let mut next_layer: Vec<Candidate> = Vec::new();

	    while !layer.is_empty() {
		if self.budget_reached( &started, expansions, discoveries ) {
		    break 'mining;
		}
		let take = BATCH_SIZE.min( layer.len() );
		let batch: Vec<Candidate> = layer.drain( .. take ).collect();
		expansions += batch.len() as u64;

		// parallel scoring against an immutable model snapshot
		let snapshot: &[MaxEnt] = models;
		let snapshot_control: &C = control;
		let mut scored: Vec<Work> = batch.into_par_iter()
		    .map_init( Scratch::new, |batch_scratch, candidate| {
			evaluate( self.min_support, candidate, snapshot, masks, &group_sizes, snapshot_control, version, batch_scratch )
		    })
		    .collect();

		// single threaded report in score order
		scored.sort_by( |left, right| {
		    right.score.total_cmp( &left.score ).then_with( || left.candidate.items.cmp( &right.candidate.items ))
		});
		for work in scored.iter_mut() {
		    if work.score > 0.0 {
			if work.version != version {
			    // the model changed under the candidate, score it afresh
			    *work = evaluate( self.min_support, work.candidate.clone(), models, masks, &group_sizes, control, version, &mut scratch );
			}
		    }
		    if work.score > 0.0 {
			let len = work.candidate.len();
			for group in 0 .. models.len() {
			    if discoveries >= self.max_discoveries {
				break 'mining;
			    }
			    let outcome = &work.groups[ group ];
			    if outcome.forbidden || outcome.log_pvalue <= control.prune_threshold( len ) {
				continue;
			    }
			    if control.admit( outcome.log_pvalue, len )
				&& models[ group ].insert_pattern( outcome.frequency, &work.candidate.items )
			    {
				discoveries += 1;
				version += 1;
				debug!( "Accepted {:?} for group {} with log p-value {:.3}",
					work.candidate.items, group, outcome.log_pvalue );
			    }
			}
		    }
		    if !work.blocked {
			lattice.expand( &work.candidate, self.min_support, &mut next_layer );
		    }
		}
	    }
	    frontier = next_layer;
	}

	info!( "Discovered {} patterns in {} expansions over {:.2}s",
	       discoveries, expansions, started.elapsed().as_secs_f64() );
	discoveries
    }

    fn budget_reached( &self, started: &Instant, expansions: u64, discoveries: u64 ) -> bool {
	expansions >= self.max_expansions
	    || discoveries >= self.max_discoveries
	    || started.elapsed().as_secs_f64() >= self.max_seconds
    }
}

/// Scores a candidate against every group model. A group contributes its log
/// p-value margin over the pruning threshold; forbidden groups contribute
/// nothing, and a candidate forbidden everywhere blocks its subtree.
fn evaluate<C>( min_support: Count, candidate: Candidate, models: &[MaxEnt], masks: &[Rowset],
		group_sizes: &[Count], control: &C, version: u64, scratch: &mut Scratch ) -> Work where
    C: SignificanceControl,
{
    let len = candidate.len();
    let threshold = control.prune_threshold( len );
    let eligible = candidate.support >= min_support;

    let mut groups = Vec::with_capacity( models.len() );
    let mut score = 0.0;
    let mut blocked = true;
    for (group, model) in models.iter().enumerate() {
	let forbidden = model.is_forbidden( &candidate.items, scratch );
	if !forbidden {
	    blocked = false;
	}
	let support = candidate.rows.intersection( &masks[ group ] ).count();
	let group_size = group_sizes[ group ];
	let frequency = if group_size == 0 { 0.0 } else { support as f64 / group_size as f64 };

	let mut log_pvalue = 0.0;
	if eligible && !forbidden && group_size > 0 {
	    let expected = model.expectation( &candidate.items, scratch );
	    log_pvalue = -binomial_log_cdf( support, expected, group_size );
	    let margin = log_pvalue - threshold;
	    if margin > 0.0 {
		score += margin;
	    }
	}
	groups.push( GroupScore{ support, frequency, log_pvalue, forbidden } );
    }

    Work{ candidate, groups, score, version, blocked }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::{fit, fit_grouped, Adjustment, DataView, FitOptions, Itemvec};

    /// 20 rows by 20 columns with two disjoint 10 column blocks.
    fn block_data() -> DataView {
	let mut rows: Vec<Itemvec> = Vec::new();
	for _ in 0 .. 10 {
	    rows.push( (0 .. 10).collect() );
	}
	for _ in 0 .. 10 {
	    rows.push( (10 .. 20).collect() );
	}
	DataView::from_transactions( &rows )
    }

    fn within_one_block( items: &[usize] ) -> bool {
	items.iter().all( |item| *item < 10 ) || items.iter().all( |item| *item >= 10 )
    }

    #[test]
    /// The family wise run explains each block with its first disjoint subsets
    /// and absorbs everything else into the null model.
    fn test_fwer_on_block_data() {
	let data = block_data();
	let model = fit( Adjustment::Fwer, &data, &FitOptions::default() ).unwrap();

	// the first quadruple of a block is surprising under independence; after
	// its insertion the next accepted candidates are those still touching
	// four unexplained components, until each block collapses into one
	// all or nothing factor
	let expected: Vec<Itemvec> = vec!(
	    vec!( 0, 1, 2, 3 ),
	    vec!( 0, 4, 5, 6 ),
	    vec!( 0, 7, 8, 9 ),
	    vec!( 10, 11, 12, 13 ),
	    vec!( 10, 14, 15, 16 ),
	    vec!( 10, 17, 18, 19 ),
	);
	let accepted: Vec<Itemvec> = model.patterns().iter().map( |(items, _)| items.clone() ).collect();
	assert_eq!( accepted, expected );
	for (_, frequency) in model.patterns() {
	    assert!( (frequency - 0.5).abs() < 1.0e-9 );
	}
    }

    #[test]
    /// No discovered pattern ever crosses the blocks, under either regime.
    fn test_no_crossing_patterns() {
	let data = block_data();
	for adjustment in [Adjustment::Fwer, Adjustment::Fdr] {
	    let model = fit( adjustment, &data, &FitOptions::default() ).unwrap();
	    assert!( !model.patterns().is_empty() );
	    for (items, _) in model.patterns() {
		assert!( within_one_block( items ), "crossing pattern {:?}", items );
		assert!( data.support( items ) >= 2 );
	    }
	}
    }

    #[test]
    /// Factor caps hold at termination regardless of the regime.
    fn test_factor_caps_hold() {
	let data = block_data();
	let mut options = FitOptions::default();
	options.max_factor_size = 3;
	options.max_factor_width = 6;
	for adjustment in [Adjustment::Fwer, Adjustment::Fdr] {
	    let model = fit( adjustment, &data, &options ).unwrap();
	    for (width, size) in model.factor_shapes() {
		assert!( size <= 3 );
		assert!( width <= 6 );
	    }
	}
    }

    #[test]
    /// With room for a single pattern per factor, no factor ever holds two.
    fn test_single_pattern_factors() {
	let data = block_data();
	let mut options = FitOptions::default();
	options.max_factor_size = 1;
	for adjustment in [Adjustment::Fwer, Adjustment::Fdr] {
	    let model = fit( adjustment, &data, &options ).unwrap();
	    assert!( !model.patterns().is_empty() );
	    for (_, size) in model.factor_shapes() {
		assert!( size <= 1 );
	    }
	}
    }

    #[test]
    fn test_discovery_budget_honored() {
	let data = block_data();
	let mut options = FitOptions::default();
	options.max_discoveries = 2;
	let model = fit( Adjustment::Fwer, &data, &options ).unwrap();

	let accepted: Vec<Itemvec> = model.patterns().iter().map( |(items, _)| items.clone() ).collect();
	assert_eq!( accepted, vec!( vec!( 0, 1, 2, 3 ), vec!( 0, 4, 5, 6 )));
    }

    #[test]
    fn test_expansion_budget_honored() {
	let data = block_data();
	let mut options = FitOptions::default();
	options.max_expansions = 5;
	let model = fit( Adjustment::Fwer, &data, &options ).unwrap();
	// the first layer of 20 singletons exhausts the budget before any
	// multi column candidate is scored
	assert!( model.patterns().is_empty() );
    }

    #[test]
    fn test_determinism() {
	let data = block_data();
	for adjustment in [Adjustment::Fwer, Adjustment::Fdr] {
	    let first = fit( adjustment, &data, &FitOptions::default() ).unwrap();
	    let second = fit( adjustment, &data, &FitOptions::default() ).unwrap();
	    assert_eq!( first.patterns(), second.patterns() );
	}
    }

    #[test]
    /// Sparse noise without structure yields at most a stray discovery.
    fn test_noise_stays_quiet() {
	// fixed linear congruential stream, about one column in ten set
	let mut state: u64 = 0x2545f4914f6cdd1d;
	let mut rows: Vec<Itemvec> = Vec::new();
	for _ in 0 .. 100 {
	    let mut row = Itemvec::new();
	    for item in 0 .. 50 {
		state = state.wrapping_mul( 6364136223846793005 ).wrapping_add( 1442695040888963407 );
		if (state >> 33) % 10 == 0 {
		    row.push( item );
		}
	    }
	    rows.push( row );
	}
	let data = DataView::from_transactions( &rows );

	let mut options = FitOptions::default();
	options.alpha = 0.01;
	let model = fit( Adjustment::Fwer, &data, &options ).unwrap();
	assert!( model.patterns().len() <= 1, "noise produced {:?}", model.patterns() );
    }

    #[test]
    /// A pair enriched in one group lands in that group's model only.
    fn test_group_enrichment() {
	let mut rows: Vec<Itemvec> = Vec::new();
	let mut labels: Vec<usize> = Vec::new();
	// group 0: items 0 and 1 always together in half the rows
	for row in 0 .. 50 {
	    rows.push( if row < 25 { vec!( 0, 1 ) } else { Itemvec::new() } );
	    labels.push( 0 );
	}
	// group 1: the same marginals, never together
	for row in 0 .. 50 {
	    rows.push( if row < 25 { vec!( 0 ) } else { vec!( 1 ) } );
	    labels.push( 1 );
	}
	let data = DataView::from_transactions( &rows );

	let models = fit_grouped( Adjustment::Fwer, &data, &labels, &FitOptions::default() ).unwrap();
	assert_eq!( models.len(), 2 );
	assert_eq!( models[0].patterns().len(), 1 );
	assert_eq!( models[0].patterns()[0].0, vec!( 0, 1 ));
	assert!( (models[0].patterns()[0].1 - 0.5).abs() < 1.0e-9 );
	assert!( models[1].patterns().is_empty() );
    }

    #[test]
    fn test_wall_clock_budget_terminates() {
	let data = block_data();
	let mut options = FitOptions::default();
	options.max_seconds = 0.0;
	let model = fit( Adjustment::Fwer, &data, &options ).unwrap();
	assert!( model.patterns().is_empty() );
    }
}
