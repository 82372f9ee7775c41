use tabled::Tabled;

#[derive(Tabled)]
pub struct RateRow {
    pub metric: String,
    pub passes: u64,
    pub fails: u64,
    #[tabled(display = "percent")]
    pub rate: f64,
}

#[derive(Tabled)]
pub struct DistributionRow {
    pub metric: String,
    pub count: u64,
    #[tabled(display = "float2")]
    pub avg: f64,
    #[tabled(display = "float2")]
    pub min: f64,
    #[tabled(display = "float2")]
    pub med: f64,
    #[tabled(display = "float2")]
    pub p90: f64,
    #[tabled(display = "float2")]
    pub p95: f64,
    #[tabled(display = "float2")]
    pub p99: f64,
    #[tabled(display = "float2")]
    pub max: f64,
}

#[derive(Tabled)]
pub struct CheckRow {
    pub check: String,
    pub passes: u64,
    pub fails: u64,
    #[tabled(display = "percent")]
    pub pass_rate: f64,
}

#[derive(Tabled)]
pub struct ThresholdRow {
    pub metric: String,
    pub threshold: String,
    #[tabled(display = "option_float")]
    pub observed: Option<f64>,
    pub result: &'static str,
    #[tabled(display = "option_text")]
    pub reason: Option<String>,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}

fn option_float(n: &Option<f64>) -> String {
    n.map(|n| format!("{:.4}", n)).unwrap_or_else(|| "-".to_string())
}

fn option_text(s: &Option<String>) -> String {
    s.clone().unwrap_or_default()
}
