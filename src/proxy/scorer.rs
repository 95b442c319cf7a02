//! Scoring of probe measurements
//!
//! Fixed weights with hard cutoffs, so scores stay comparable between runs.

use crate::proxy::models::Measurement;

/// Highest score a config can reach
pub const MAX_SCORE: f64 = 100.0;

const TLS_POINTS: f64 = 25.0;

const FAST_LATENCY_MS: f64 = 50.0;
const FAST_LATENCY_POINTS: f64 = 30.0;
const OK_LATENCY_MS: f64 = 100.0;
const OK_LATENCY_POINTS: f64 = 15.0;

const HIGH_THROUGHPUT_MBPS: f64 = 5.0;
const HIGH_THROUGHPUT_POINTS: f64 = 30.0;
const LOW_THROUGHPUT_MBPS: f64 = 1.0;
const LOW_THROUGHPUT_POINTS: f64 = 10.0;

const FAST_DNS_MS: f64 = 100.0;
const FAST_DNS_POINTS: f64 = 10.0;

const NO_LOSS_POINTS: f64 = 5.0;

/// Reduce a measurement to a single score in `0..=100`.
///
/// A zero latency means no latency was measured. It earns nothing, and
/// neither does a zero packet loss without a latency measurement behind it.
pub fn score(m: &Measurement) -> f64 {
    let mut score = 0.0;

    if m.tls_ok {
        score += TLS_POINTS;
    }

    let latency_measured = m.latency_ms > 0.0;
    if latency_measured {
        if m.latency_ms < FAST_LATENCY_MS {
            score += FAST_LATENCY_POINTS;
        } else if m.latency_ms < OK_LATENCY_MS {
            score += OK_LATENCY_POINTS;
        }
    }

    if m.throughput_mbps > HIGH_THROUGHPUT_MBPS {
        score += HIGH_THROUGHPUT_POINTS;
    } else if m.throughput_mbps > LOW_THROUGHPUT_MBPS {
        score += LOW_THROUGHPUT_POINTS;
    }

    if m.dns_resolution_ms > 0.0 && m.dns_resolution_ms < FAST_DNS_MS {
        score += FAST_DNS_POINTS;
    }

    if latency_measured && m.packet_loss_pct == 0.0 {
        score += NO_LOSS_POINTS;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn best() -> Measurement {
        Measurement {
            tls_ok: true,
            latency_ms: 25.0,
            throughput_mbps: 10.0,
            dns_resolution_ms: 50.0,
            packet_loss_pct: 0.0,
        }
    }

    #[test]
    fn test_default_scores_zero() {
        assert_eq!(score(&Measurement::default()), 0.0);
    }

    #[test]
    fn test_best_scores_max() {
        assert_eq!(score(&best()), MAX_SCORE);
    }

    #[test]
    fn test_score_is_deterministic() {
        let m = Measurement {
            latency_ms: 73.0,
            throughput_mbps: 2.5,
            ..best()
        };
        let first = score(&m);
        for _ in 0..10 {
            assert_eq!(score(&m), first);
        }
    }

    #[test]
    fn test_tls_only() {
        let m = Measurement {
            tls_ok: true,
            ..Measurement::default()
        };
        assert_eq!(score(&m), 25.0);
    }

    #[test]
    fn test_latency_tiers() {
        let with_latency = |latency_ms| Measurement {
            latency_ms,
            packet_loss_pct: 100.0,
            ..Measurement::default()
        };
        assert_eq!(score(&with_latency(1.0)), 30.0);
        assert_eq!(score(&with_latency(49.0)), 30.0);
        assert_eq!(score(&with_latency(50.0)), 15.0);
        assert_eq!(score(&with_latency(99.0)), 15.0);
        assert_eq!(score(&with_latency(100.0)), 0.0);
        assert_eq!(score(&with_latency(450.0)), 0.0);
    }

    #[test]
    fn test_unmeasured_latency_earns_nothing() {
        let m = Measurement {
            latency_ms: 0.0,
            packet_loss_pct: 0.0,
            ..Measurement::default()
        };
        assert_eq!(score(&m), 0.0);
    }

    #[test]
    fn test_throughput_tiers() {
        let with_throughput = |throughput_mbps| Measurement {
            throughput_mbps,
            ..Measurement::default()
        };
        assert_eq!(score(&with_throughput(0.5)), 0.0);
        assert_eq!(score(&with_throughput(1.0)), 0.0);
        assert_eq!(score(&with_throughput(1.5)), 10.0);
        assert_eq!(score(&with_throughput(5.0)), 10.0);
        assert_eq!(score(&with_throughput(5.1)), 30.0);
    }

    #[test]
    fn test_dns_cutoff() {
        let with_dns = |dns_resolution_ms| Measurement {
            dns_resolution_ms,
            ..Measurement::default()
        };
        assert_eq!(score(&with_dns(0.0)), 0.0);
        assert_eq!(score(&with_dns(12.0)), 10.0);
        assert_eq!(score(&with_dns(100.0)), 0.0);
    }

    #[test]
    fn test_packet_loss_requires_zero() {
        let lossy = Measurement {
            packet_loss_pct: 20.0,
            ..best()
        };
        assert_eq!(score(&lossy), MAX_SCORE - 5.0);
    }

    #[test]
    fn test_tcp_fallback_latency_counts_as_lossless() {
        // The fallback connect measures latency but cannot measure loss
        let m = Measurement {
            latency_ms: 80.0,
            ..Measurement::default()
        };
        assert_eq!(score(&m), 20.0);
    }

    #[test]
    fn test_sub_millisecond_latency_is_measured() {
        let m = Measurement {
            latency_ms: 0.3,
            dns_resolution_ms: 0.2,
            ..Measurement::default()
        };
        // +30 latency, +10 DNS, +5 no loss
        assert_eq!(score(&m), 45.0);
    }
}
