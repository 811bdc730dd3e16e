
use std::f64::consts::PI;

/// Decides which scored candidates may enter the null model. Implementations
/// are read concurrently during scoring and mutated only during report.
pub trait SignificanceControl: Sync {
    /// Minimum log p-value a candidate of the given length must exceed to stay eligible.
    fn prune_threshold( &self, len: usize ) -> f64;

    /// Sequentially tests an eligible candidate given its log p-value;
    /// true admits the pattern into the model.
    fn admit( &mut self, log_pvalue: f64, len: usize ) -> bool;
}

/// Log of the family wise threshold for itemsets of the given length:
/// a Stirling bound on the Bonferroni correction over the choose(m, len)
/// hypotheses of that layer.
pub fn log_fwer_adjustment( alpha: f64, len: usize, num_singletons: usize ) -> f64 {
    let k = len as f64;
    let m = num_singletons as f64;
    alpha.ln() - k * (1.0 + m.ln() - k.ln())
}

/// Family wise error rate control with a log adjusted per layer threshold.
///
/// The layer is the minimum itemset length the correction is computed for.
/// It only grows: accepting a pattern of greater length raises the bar for
/// every shorter candidate tested afterwards.
#[derive( Debug )]
pub struct FwerControl {
    alpha: f64,
    num_singletons: usize,
    layer: usize,
}

impl FwerControl {

    pub fn new( alpha: f64, num_singletons: usize ) -> FwerControl {
	FwerControl{ alpha, num_singletons, layer: 1 }
    }

    pub fn layer( &self ) -> usize {
	self.layer
    }
}

impl SignificanceControl for FwerControl {

    fn prune_threshold( &self, len: usize ) -> f64 {
	-log_fwer_adjustment( self.alpha, len.max( self.layer ), self.num_singletons )
    }

    fn admit( &mut self, log_pvalue: f64, len: usize ) -> bool {
	let passed = log_pvalue >= self.prune_threshold( len );
	if passed {
	    self.layer = self.layer.max( len );
	}
	passed
    }
}

/// False discovery rate control with the sequential LORD procedure:
/// alpha wealth is spent on every test and replenished on rejections,
/// with per test levels keyed to the distance from the last rejection.
#[derive( Debug )]
pub struct LordControl {
    alpha: f64,
    /// wealth replenished on every rejection
    payout: f64,
    wealth: f64,
    wealth_at_rejection: f64,
    /// current per test level
    level: f64,
    step: u64,
    last_rejection: u64,
}

impl LordControl {

    pub fn new( alpha: f64 ) -> LordControl {
	LordControl::with_initial_fraction( alpha, 0.5 )
    }

    /// The initial wealth is the given fraction of alpha; the payout per
    /// rejection is the remainder.
    pub fn with_initial_fraction( alpha: f64, fraction: f64 ) -> LordControl {
	let initial_wealth = alpha * fraction;
	let payout = alpha - initial_wealth;
	let mut control = LordControl{
	    alpha,
	    payout,
	    wealth: initial_wealth,
	    wealth_at_rejection: initial_wealth,
	    level: 0.0,
	    step: 1,
	    last_rejection: 0,
	};
	control.level = control.spend_rate( 1 ) * initial_wealth;
	control
    }

    /// Fraction of the wealth at the last rejection spent on a test at the
    /// given distance from that rejection.
    fn spend_rate( &self, distance: u64 ) -> f64 {
	let k = distance as f64;
	(6.0 / (PI * PI * k * k)) * (self.alpha / self.payout) / (1.0 + k.ln())
    }

    pub fn wealth( &self ) -> f64 {
	self.wealth
    }

    pub fn level( &self ) -> f64 {
	self.level
    }
}

impl SignificanceControl for LordControl {

    fn prune_threshold( &self, _len: usize ) -> f64 {
	-self.alpha.ln()
    }

    fn admit( &mut self, log_pvalue: f64, _len: usize ) -> bool {
	let pvalue = (-log_pvalue).exp();
	let reject = pvalue < self.level;
	if reject {
	    self.last_rejection = self.step;
	    self.wealth_at_rejection = self.wealth;
	}
	self.step += 1;
	self.level = self.spend_rate( self.step - self.last_rejection ) * self.wealth_at_rejection;
	self.wealth -= self.level;
	if reject {
	    self.wealth += self.payout;
	}
	reject
    }
}

#[cfg(test)]
mod test {

    use super::*;

    macro_rules! assert_approx {
	($real:expr, $expected:expr, $delta:expr) => {
	    if $real < $expected - $delta || $real > $expected + $delta {
		panic!( "Violate {:.10} == {:.10} (+-{:.10})", $real, $expected, $delta );
	    }
	}
    }

    #[test]
    fn test_fwer_adjustment_formula() {
	let adjustment = log_fwer_adjustment( 0.05, 2, 20 );
	let expected = 0.05_f64.ln() - 2.0 * (1.0 + 20.0_f64.ln() - 2.0_f64.ln());
	assert_approx!( adjustment, expected, 1.0e-12 );
	assert_approx!( adjustment, -9.6009024595, 1.0e-6 );
    }

    #[test]
    fn test_fwer_layer_grows_monotonically() {
	let mut control = FwerControl::new( 0.05, 100 );
	assert_eq!( control.layer(), 1 );

	let threshold_before = control.prune_threshold( 2 );
	assert!( control.admit( 1.0e6, 5 ));
	assert_eq!( control.layer(), 5 );
	// shorter candidates are now tested at the raised layer
	assert!( control.prune_threshold( 2 ) > threshold_before );

	// admitting short never lowers the layer
	assert!( control.admit( 1.0e6, 2 ));
	assert_eq!( control.layer(), 5 );

	// a failed test leaves the layer alone
	assert!( !control.admit( 0.1, 9 ));
	assert_eq!( control.layer(), 5 );
    }

    #[test]
    fn test_fwer_threshold_test() {
	let mut control = FwerControl::new( 0.05, 20 );
	// pv must reach -log_fwer_adjustment(alpha, 2, 20) = 9.6009
	assert!( !control.admit( 9.0, 2 ));
	assert!( control.admit( 9.7, 2 ));
    }

    #[test]
    /// Mirrors the LORD recurrence step by step.
    fn test_lord_recurrence() {
	let mut control = LordControl::new( 0.05 );
	// w0 = b0 = 0.025, level = xi(1) * w0 with xi(1) = (6 / pi^2) * 2
	assert_approx!( control.wealth(), 0.025, 1.0e-12 );
	assert_approx!( control.level(), 0.0303963551, 1.0e-9 );

	// p = 0.01 rejects: tau = 1, w_tau = 0.025, next gap 1
	assert!( control.admit( -(0.01_f64.ln()), 2 ));
	assert_approx!( control.level(), 0.0303963551, 1.0e-9 );
	assert_approx!( control.wealth(), 0.025 - 0.0303963551 + 0.025, 1.0e-9 );

	// p = 0.5 fails: gap 2, level = xi(2) * w_tau
	assert!( !control.admit( -(0.5_f64.ln()), 2 ));
	let rate_2 = (6.0 / (PI * PI * 4.0)) * 2.0 / (1.0 + 2.0_f64.ln());
	assert_approx!( control.level(), rate_2 * 0.025, 1.0e-12 );
	assert_approx!( control.wealth(), 0.0196036449 - rate_2 * 0.025, 1.0e-9 );
    }

    #[test]
    fn test_lord_prune_threshold() {
	let control = LordControl::new( 0.05 );
	assert_approx!( control.prune_threshold( 3 ), -(0.05_f64.ln()), 1.0e-12 );
	// length does not matter to the sequential test
	assert_approx!( control.prune_threshold( 7 ), control.prune_threshold( 1 ), 1.0e-12 );
    }

    #[test]
    /// Wealth may go negative between rejections without stopping the procedure.
    fn test_lord_wealth_can_deplete() {
	let mut control = LordControl::new( 0.05 );
	for _ in 0 .. 50 {
	    assert!( !control.admit( -(0.99_f64.ln()), 2 ));
	}
	assert!( control.level() > 0.0 );
    }
}
