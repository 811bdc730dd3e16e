
use statrs::function::gamma::ln_gamma;

/// Most negative log probability the scorer reports; stands in for log(0)
/// while staying finite under negation and comparison.
pub const LOG_PROB_FLOOR: f64 = -1.0e300;

/// Populations at least this large use the Chernoff bound instead of exact summation.
const EXACT_LIMIT: usize = 50;

/// Upper tail log probability log P(X >= s) for X ~ Binomial(n, p).
///
/// Exact log space summation below the population limit, Chernoff bound
/// -n KL(s/n || p) above it. The bound only measures the upper tail; below
/// the mean the result is 0, i.e. not surprising. p is clamped into [0, 1].
pub fn binomial_log_cdf( s: usize, p: f64, n: usize ) -> f64 {
    let p = p.clamp( 0.0, 1.0 );
    if s == 0 || n == 0 {
	return 0.0;
    }
    if s > n {
	return LOG_PROB_FLOOR;
    }
    if p <= 0.0 {
	return LOG_PROB_FLOOR;
    }
    if p >= 1.0 {
	return 0.0;
    }

    let log_tail = if n < EXACT_LIMIT { log_tail_exact( s, p, n ) } else { log_tail_chernoff( s, p, n ) };
    log_tail.max( LOG_PROB_FLOOR ).min( 0.0 )
}

/// Sums the tail on the far side of the mean, complementing through the
/// mirrored distribution P(X >= s; n, p) = 1 - P(X' >= n-s+1; n, 1-p) otherwise.
fn log_tail_exact( s: usize, p: f64, n: usize ) -> f64 {
    let mean = n as f64 * p;
    if s as f64 > mean {
	return log_sum_upper( s, p, n );
    }

    // s >= 1 keeps the mirrored start within range, and it lies beyond the mirrored mean
    let log_complement = log_sum_upper( n - s + 1, 1.0 - p, n );
    let complement = log_complement.exp();
    if complement >= 1.0 {
	LOG_PROB_FLOOR
    } else {
	(-complement).ln_1p()
    }
}

/// Log of the sum of PMF terms from s to n; requires s beyond the mean so the
/// first term dominates the monotonically decaying series.
fn log_sum_upper( s: usize, p: f64, n: usize ) -> f64 {
    let log_p = p.ln();
    let log_q = (1.0 - p).ln();
    let log_choose_all = ln_gamma( n as f64 + 1.0 );
    let log_pmf = |k: usize| {
	log_choose_all - ln_gamma( k as f64 + 1.0 ) - ln_gamma( (n - k) as f64 + 1.0 )
	    + k as f64 * log_p + (n - k) as f64 * log_q
    };

    let first = log_pmf( s );
    let mut scaled_sum = 0.0;
    for k in s ..= n {
	scaled_sum += (log_pmf( k ) - first).exp();
    }
    first + scaled_sum.ln()
}

fn log_tail_chernoff( s: usize, p: f64, n: usize ) -> f64 {
    let q = s as f64 / n as f64;
    if q <= p {
	return 0.0;
    }
    -(n as f64) * kl_bernoulli( q, p )
}

/// KL divergence between Bernoulli(q) and Bernoulli(p) with 0 log 0 = 0.
fn kl_bernoulli( q: f64, p: f64 ) -> f64 {
    let mut divergence = 0.0;
    if q > 0.0 {
	divergence += q * (q / p).ln();
    }
    if q < 1.0 {
	divergence += (1.0 - q) * ((1.0 - q) / (1.0 - p)).ln();
    }
    divergence
}
