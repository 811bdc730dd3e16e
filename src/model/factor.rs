
use bit_set::BitSet;
use tracing::*;

use crate::{Item, Itemvec};

/// Largest deviation between a fitted marginal and its empirical target.
const FIT_TOLERANCE: f64 = 1.0e-6;
const MAX_FIT_PASSES: usize = 500;
/// Keeps frequencies away from the degenerate endpoints of the logit.
const FREQ_CLAMP: f64 = 1.0e-9;

/// A pattern folded into a factor together with its empirical frequency and fitted weight.
#[derive( Debug, Clone )]
struct FactorPattern {
    /// member positions within the factor
    items: BitSet,
    freq: f64,
    log_weight: f64,
    /// cached decomposition of weight - 1, refreshed after every weight update
    shifted_log: f64,
    shifted_sign: f64,
}

/// A local maximum entropy distribution over a bounded set of singletons,
/// constrained to reproduce the empirical marginals of its singletons and
/// of the patterns folded into it.
#[derive( Debug, Clone )]
pub struct Factor {
    /// covered columns in ascending order
    members: Itemvec,
    /// empirical singleton frequencies, aligned with members
    freqs: Vec<f64>,
    /// singleton log odds weights
    log_u: Vec<f64>,
    /// cached log( u / (1 + u) ) per singleton
    log_a: Vec<f64>,
    patterns: Vec<FactorPattern>,
    /// cached log normalizer of the pattern expansion
    log_z: f64,
}

/// Reusable buffers for factor inference, owned by one worker at a time.
#[derive( Debug, Default )]
pub struct Inference {
    union: BitSet,
    positive: Vec<f64>,
    negative: Vec<f64>,
}

impl Factor {

    /// Creates a pattern free factor; its marginals match the targets exactly.
    pub fn new( members: Itemvec, freqs: Vec<f64> ) -> Factor {
	let freqs: Vec<f64> = freqs.iter().map( |f| f.clamp( FREQ_CLAMP, 1.0 - FREQ_CLAMP )).collect();
	let log_u: Vec<f64> = freqs.iter().map( |f| logit( *f )).collect();
	let log_a: Vec<f64> = freqs.iter().map( |f| f.ln() ).collect();
	Factor{ members, freqs, log_u, log_a, patterns: Vec::new(), log_z: 0.0 }
    }

    pub fn width( &self ) -> usize {
	self.members.len()
    }

    pub fn size( &self ) -> usize {
	self.patterns.len()
    }

    pub fn members( &self ) -> &[Item] {
	&self.members
    }

    /// Position of the column within the factor, if covered.
    pub fn position( &self, item: Item ) -> Option<usize> {
	self.members.binary_search( &item ).ok()
    }

    /// Yields the folded in patterns with their empirical frequencies, items as column ids.
    pub fn patterns<'a>( &'a self ) -> impl Iterator<Item = (Itemvec, f64)> + 'a {
	self.patterns.iter().map( |pattern| {
	    let items: Itemvec = pattern.items.iter().map( |position| self.members[ position ] ).collect();
	    (items, pattern.freq)
	})
    }

    /// Folds a pattern into the factor with weight one; call fit to restore the marginals.
    pub fn add_pattern( &mut self, items: &[Item], freq: f64 ) {
	let positions: BitSet = items.iter()
	    .map( |item| self.position( *item ).expect( "pattern items are members of the factor" ))
	    .collect();
	let mut pattern = FactorPattern{
	    items: positions,
	    freq: freq.clamp( FREQ_CLAMP, 1.0 - FREQ_CLAMP ),
	    log_weight: 0.0,
	    shifted_log: f64::NEG_INFINITY,
	    shifted_sign: 0.0,
	};
	pattern.refresh();
	self.patterns.push( pattern );
    }

    /// Log marginal probability that all member positions of the query are on.
    pub fn log_marginal( &self, query: &BitSet, scratch: &mut Inference ) -> f64 {
	if self.patterns.is_empty() {
	    return query.iter().map( |position| self.log_a[ position ] ).sum();
	}
	self.log_gsum( query, scratch ) - self.log_z
    }

    /// Iterative scaling until singleton and pattern marginals match the
    /// empirical targets, or the pass budget runs out.
    pub fn fit( &mut self ) {
	if self.patterns.is_empty() {
	    for position in 0 .. self.members.len() {
		self.log_u[ position ] = logit( self.freqs[ position ] );
		self.log_a[ position ] = self.freqs[ position ].ln();
	    }
	    self.log_z = 0.0;
	    return;
	}

	let mut scratch = Inference::default();
	let mut query = BitSet::new();
	let mut worst = f64::INFINITY;
	let mut passes = 0;
	while worst > FIT_TOLERANCE && passes < MAX_FIT_PASSES {
	    worst = 0.0;
	    for position in 0 .. self.members.len() {
		query.clear();
		query.insert( position );
		let marginal = self.marginal_of( &query, &mut scratch );
		let target = self.freqs[ position ];
		worst = worst.max( (marginal - target).abs() );
		self.log_u[ position ] += logit( target ) - logit( marginal );
		self.log_a[ position ] = log_sigmoid( self.log_u[ position ] );
	    }
	    for index in 0 .. self.patterns.len() {
		query.clone_from( &self.patterns[ index ].items );
		let marginal = self.marginal_of( &query, &mut scratch );
		let target = self.patterns[ index ].freq;
		worst = worst.max( (marginal - target).abs() );
		self.patterns[ index ].log_weight += logit( target ) - logit( marginal );
		self.patterns[ index ].refresh();
	    }
	    passes += 1;
	}

	query.clear();
	self.log_z = self.log_gsum( &query, &mut scratch );
	trace!( "Factor over {:?} fitted in {} passes, worst deviation {:.2e}", self.members, passes, worst );
    }

    /// Current marginal of the query, clamped away from the logit endpoints.
    fn marginal_of( &self, query: &BitSet, scratch: &mut Inference ) -> f64 {
	let log_z = self.log_gsum( &BitSet::new(), scratch );
	let log_g = self.log_gsum( query, scratch );
	(log_g - log_z).exp().clamp( FREQ_CLAMP, 1.0 - FREQ_CLAMP )
    }

    /// Unnormalized log mass of all states containing the query.
    ///
    /// Expanding every pattern weight as w^[x contains P] = 1 + (w - 1) [x contains P]
    /// turns the mass into a signed sum over pattern subsets T, each term a plain
    /// product of singleton weights over the union of the query with the patterns
    /// of T. The sum has 2^size terms, evaluated in log space with sign tracking.
    fn log_gsum( &self, query: &BitSet, scratch: &mut Inference ) -> f64 {
	scratch.positive.clear();
	scratch.negative.clear();

	let count = self.patterns.len();
	'subsets: for subset in 0u32 .. (1u32 << count) {
	    let mut log_term = 0.0;
	    let mut sign = 1.0;
	    scratch.union.clone_from( query );
	    for (index, pattern) in self.patterns.iter().enumerate() {
		if subset & (1 << index) == 0 {
		    continue;
		}
		if pattern.shifted_sign == 0.0 {
		    continue 'subsets;
		}
		log_term += pattern.shifted_log;
		sign *= pattern.shifted_sign;
		scratch.union.union_with( &pattern.items );
	    }
	    log_term += scratch.union.iter().map( |position| self.log_a[ position ] ).sum::<f64>();
	    if sign > 0.0 {
		scratch.positive.push( log_term );
	    } else {
		scratch.negative.push( log_term );
	    }
	}

	log_difference( log_sum_exp( &scratch.positive ), log_sum_exp( &scratch.negative ))
    }
}

impl FactorPattern {

    /// Refreshes the cached sign and log magnitude of weight - 1.
    fn refresh( &mut self ) {
	// beyond the exponent range of f64 the shift by one vanishes
	if self.log_weight > 690.0 {
	    self.shifted_log = self.log_weight;
	    self.shifted_sign = 1.0;
	    return;
	}
	let shifted = self.log_weight.exp() - 1.0;
	if shifted == 0.0 {
	    self.shifted_log = f64::NEG_INFINITY;
	    self.shifted_sign = 0.0;
	} else {
	    self.shifted_log = shifted.abs().ln();
	    self.shifted_sign = shifted.signum();
	}
    }
}

fn logit( x: f64 ) -> f64 {
    (x / (1.0 - x)).ln()
}

/// Stable log( u / (1 + u) ) for u given in log space.
fn log_sigmoid( log_u: f64 ) -> f64 {
    // log u - log(1 + u) = -softplus(-log u)
    -(-log_u).exp().ln_1p()
}

fn log_sum_exp( terms: &[f64] ) -> f64 {
    let greatest = terms.iter().cloned().fold( f64::NEG_INFINITY, f64::max );
    if !greatest.is_finite() {
	return f64::NEG_INFINITY;
    }
    greatest + terms.iter().map( |term| (term - greatest).exp() ).sum::<f64>().ln()
}

/// log( exp(log_pos) - exp(log_neg) ); negative infinity if the difference vanishes.
fn log_difference( log_pos: f64, log_neg: f64 ) -> f64 {
    if log_neg == f64::NEG_INFINITY {
	return log_pos;
    }
    if log_neg >= log_pos {
	return f64::NEG_INFINITY;
    }
    log_pos + (-(log_neg - log_pos).exp()).ln_1p()
}

#[cfg(test)]
mod test {

    use super::*;

    macro_rules! assert_approx {
	($real:expr, $expected:expr, $delta:expr) => {
	    if $real < $expected - $delta || $real > $expected + $delta {
		panic!( "Violate {:.6} == {:.6} (+-{:.6})", $real, $expected, $delta );
	    }
	}
    }

    fn marginal( factor: &Factor, positions: &[usize] ) -> f64 {
	let query: BitSet = positions.iter().copied().collect();
	factor.log_marginal( &query, &mut Inference::default() ).exp()
    }

    #[test]
    fn test_pattern_free_marginals() {
	let factor = Factor::new( vec!( 3, 7 ), vec!( 0.2, 0.5 ));
	assert_approx!( marginal( &factor, &[0] ), 0.2, 1.0e-9 );
	assert_approx!( marginal( &factor, &[1] ), 0.5, 1.0e-9 );
	// members are independent without patterns
	assert_approx!( marginal( &factor, &[0, 1] ), 0.1, 1.0e-9 );
	assert_approx!( marginal( &factor, &[] ), 1.0, 1.0e-9 );
    }

    #[test]
    fn test_fit_reproduces_pattern_marginal() {
	let mut factor = Factor::new( vec!( 0, 1 ), vec!( 0.5, 0.5 ));
	factor.add_pattern( &[0, 1], 0.4 );
	factor.fit();

	assert_approx!( marginal( &factor, &[0, 1] ), 0.4, 1.0e-4 );
	assert_approx!( marginal( &factor, &[0] ), 0.5, 1.0e-4 );
	assert_approx!( marginal( &factor, &[1] ), 0.5, 1.0e-4 );
    }

    #[test]
    /// A pattern rarer than independence predicts needs a weight below one.
    fn test_fit_with_repulsive_pattern() {
	let mut factor = Factor::new( vec!( 0, 1 ), vec!( 0.5, 0.5 ));
	factor.add_pattern( &[0, 1], 0.1 );
	factor.fit();

	assert_approx!( marginal( &factor, &[0, 1] ), 0.1, 1.0e-4 );
	assert_approx!( marginal( &factor, &[0] ), 0.5, 1.0e-4 );
    }

    #[test]
    /// Members untouched by any pattern stay independent of the rest.
    fn test_unconstrained_member_stays_independent() {
	let mut factor = Factor::new( vec!( 0, 1, 2 ), vec!( 0.5, 0.5, 0.25 ));
	factor.add_pattern( &[0, 1], 0.4 );
	factor.fit();

	assert_approx!( marginal( &factor, &[2] ), 0.25, 1.0e-4 );
	assert_approx!( marginal( &factor, &[0, 1, 2] ), 0.4 * 0.25, 1.0e-3 );
    }

    #[test]
    fn test_two_overlapping_patterns() {
	let mut factor = Factor::new( vec!( 0, 1, 2 ), vec!( 0.5, 0.6, 0.4 ));
	factor.add_pattern( &[0, 1], 0.45 );
	factor.add_pattern( &[1, 2], 0.35 );
	factor.fit();

	assert_approx!( marginal( &factor, &[0, 1] ), 0.45, 1.0e-4 );
	assert_approx!( marginal( &factor, &[1, 2] ), 0.35, 1.0e-4 );
	assert_approx!( marginal( &factor, &[0] ), 0.5, 1.0e-4 );
	assert_approx!( marginal( &factor, &[1] ), 0.6, 1.0e-4 );
	assert_approx!( marginal( &factor, &[2] ), 0.4, 1.0e-4 );
    }

    #[test]
    fn test_pattern_round_trip() {
	let mut factor = Factor::new( vec!( 2, 5, 9 ), vec!( 0.5, 0.5, 0.5 ));
	factor.add_pattern( &[2, 9], 0.3 );
	let collected: Vec<(Itemvec, f64)> = factor.patterns().collect();
	assert_eq!( collected.len(), 1 );
	assert_eq!( collected[0].0, vec!( 2, 9 ));
	assert_approx!( collected[0].1, 0.3, 1.0e-9 );
    }
}
