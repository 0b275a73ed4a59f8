use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, OnceLock},
};

static METRICS: OnceLock<Mutex<MetricsState>> = OnceLock::new();

// 分桶上界（毫秒）：<50, <100, <250, <500, <1000, >=1000
const LATENCY_BOUNDS_MS: [u128; 5] = [50, 100, 250, 500, 1000];

#[derive(Default)]
struct UpstreamStats {
    ok: u64,
    err: u64,
    latency_sum_ms: u128,
    hist_buckets: [u64; 6],
    breaker_rejections: u64,
}

#[derive(Default)]
struct MetricsState {
    total: u64,
    errors: u64,
    per_endpoint: BTreeMap<&'static str, u64>,
    per_endpoint_err: BTreeMap<&'static str, u64>,
    upstream: BTreeMap<&'static str, UpstreamStats>,
    scans_started: u64,
    scans_completed: u64,
    scans_failed: u64,
    cache_hits: u64,
    cache_misses: u64,
    derivations: u64,
}

fn state() -> MutexGuard<'static, MetricsState> {
    let m = METRICS.get_or_init(|| Mutex::new(MetricsState::default()));
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

pub fn count_ok(endpoint: &'static str) {
    let mut s = state();
    s.total += 1;
    *s.per_endpoint.entry(endpoint).or_insert(0) += 1;
}

pub fn count_err(endpoint: &'static str) {
    let mut s = state();
    s.total += 1;
    s.errors += 1;
    *s.per_endpoint.entry(endpoint).or_insert(0) += 1;
    *s.per_endpoint_err.entry(endpoint).or_insert(0) += 1;
}

pub fn observe_upstream(provider: &'static str, latency_ms: u128, ok: bool) {
    let mut s = state();
    let u = s.upstream.entry(provider).or_default();
    if ok {
        u.ok += 1;
    } else {
        u.err += 1;
    }
    u.latency_sum_ms += latency_ms;
    let b = LATENCY_BOUNDS_MS
        .iter()
        .position(|bound| latency_ms < *bound)
        .unwrap_or(LATENCY_BOUNDS_MS.len());
    u.hist_buckets[b] += 1;
}

pub fn inc_breaker_rejection(provider: &'static str) {
    state().upstream.entry(provider).or_default().breaker_rejections += 1;
}

pub fn inc_scan_started() {
    state().scans_started += 1;
}

pub fn inc_scan_completed() {
    state().scans_completed += 1;
}

pub fn inc_scan_failed() {
    state().scans_failed += 1;
}

pub fn inc_cache(hit: bool) {
    let mut s = state();
    if hit {
        s.cache_hits += 1;
    } else {
        s.cache_misses += 1;
    }
}

pub fn inc_derivation() {
    state().derivations += 1;
}

fn counter(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    out.push_str(&format!("# HELP {} {}\n", name, help));
    out.push_str(&format!("# TYPE {} counter\n", name));
    out.push_str(&format!("{} {}\n", name, value));
}

pub fn render_prometheus() -> String {
    let s = state();
    let mut out = String::new();

    counter(&mut out, "keyscan_requests_total", "Total requests", s.total);
    counter(&mut out, "keyscan_errors_total", "Total error responses", s.errors);

    out.push_str("# HELP keyscan_endpoint_requests_total Requests per endpoint\n");
    out.push_str("# TYPE keyscan_endpoint_requests_total counter\n");
    for (k, v) in s.per_endpoint.iter() {
        out.push_str(&format!(
            "keyscan_endpoint_requests_total{{endpoint=\"{}\"}} {}\n",
            k, v
        ));
    }

    out.push_str("# HELP keyscan_endpoint_errors_total Errors per endpoint\n");
    out.push_str("# TYPE keyscan_endpoint_errors_total counter\n");
    for (k, v) in s.per_endpoint_err.iter() {
        out.push_str(&format!(
            "keyscan_endpoint_errors_total{{endpoint=\"{}\"}} {}\n",
            k, v
        ));
    }

    // 上游统计
    out.push_str("# HELP keyscan_upstream_requests_total Upstream requests per provider\n");
    out.push_str("# TYPE keyscan_upstream_requests_total counter\n");
    for (p, u) in s.upstream.iter() {
        out.push_str(&format!(
            "keyscan_upstream_requests_total{{provider=\"{}\",result=\"ok\"}} {}\n",
            p, u.ok
        ));
        out.push_str(&format!(
            "keyscan_upstream_requests_total{{provider=\"{}\",result=\"err\"}} {}\n",
            p, u.err
        ));
    }

    out.push_str("# HELP keyscan_upstream_latency_ms_sum Sum of upstream latency in ms\n");
    out.push_str("# TYPE keyscan_upstream_latency_ms_sum counter\n");
    for (p, u) in s.upstream.iter() {
        out.push_str(&format!(
            "keyscan_upstream_latency_ms_sum{{provider=\"{}\"}} {}\n",
            p, u.latency_sum_ms
        ));
    }

    out.push_str("# HELP keyscan_upstream_latency_ms_bucket Upstream latency histogram buckets\n");
    out.push_str("# TYPE keyscan_upstream_latency_ms_bucket histogram\n");
    for (p, u) in s.upstream.iter() {
        let mut cumulative = 0u64;
        for (i, bound) in LATENCY_BOUNDS_MS.iter().enumerate() {
            cumulative += u.hist_buckets[i];
            out.push_str(&format!(
                "keyscan_upstream_latency_ms_bucket{{provider=\"{}\",le=\"{}\"}} {}\n",
                p, bound, cumulative
            ));
        }
        // +Inf 桶
        out.push_str(&format!(
            "keyscan_upstream_latency_ms_bucket{{provider=\"{}\",le=\"+Inf\"}} {}\n",
            p,
            u.hist_buckets.iter().sum::<u64>()
        ));
    }

    out.push_str("# HELP keyscan_breaker_rejections_total Calls rejected by an open circuit breaker\n");
    out.push_str("# TYPE keyscan_breaker_rejections_total counter\n");
    for (p, u) in s.upstream.iter() {
        out.push_str(&format!(
            "keyscan_breaker_rejections_total{{provider=\"{}\"}} {}\n",
            p, u.breaker_rejections
        ));
    }

    out.push_str("# HELP keyscan_scans_total Scan jobs by outcome\n");
    out.push_str("# TYPE keyscan_scans_total counter\n");
    out.push_str(&format!("keyscan_scans_total{{outcome=\"started\"}} {}\n", s.scans_started));
    out.push_str(&format!(
        "keyscan_scans_total{{outcome=\"completed\"}} {}\n",
        s.scans_completed
    ));
    out.push_str(&format!("keyscan_scans_total{{outcome=\"error\"}} {}\n", s.scans_failed));

    out.push_str("# HELP keyscan_cache_lookups_total Scan cache lookups\n");
    out.push_str("# TYPE keyscan_cache_lookups_total counter\n");
    out.push_str(&format!("keyscan_cache_lookups_total{{result=\"hit\"}} {}\n", s.cache_hits));
    out.push_str(&format!("keyscan_cache_lookups_total{{result=\"miss\"}} {}\n", s.cache_misses));

    counter(
        &mut out,
        "keyscan_derivations_total",
        "Successful key derivations",
        s.derivations,
    );

    out
}
