use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    BreakevenResult, InputError, Region, SWEEP_ITERATIONS, SimulationInputs, SimulationParams,
    SimulationSummary, SweepResult, UkTaxOracle, Wrapper, YearlyMedians, breakeven_table,
    parameter_sweep, run_simulation, summarise, yearly_medians,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWrapper {
    Isa,
    Gia,
}

impl From<CliWrapper> for Wrapper {
    fn from(value: CliWrapper) -> Self {
        match value {
            CliWrapper::Isa => Wrapper::Isa,
            CliWrapper::Gia => Wrapper::Gia,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWrapper {
    #[serde(alias = "ISA", alias = "stocks-and-shares-isa")]
    Isa,
    #[serde(alias = "GIA", alias = "general")]
    Gia,
}

impl From<ApiWrapper> for CliWrapper {
    fn from(value: ApiWrapper) -> Self {
        match value {
            ApiWrapper::Isa => CliWrapper::Isa,
            ApiWrapper::Gia => CliWrapper::Gia,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    loan_balance: Option<f64>,
    salary: Option<f64>,
    salary_growth: Option<f64>,
    current_age: Option<u32>,
    years_since_first_repayment: Option<u32>,
    region: Option<String>,
    monthly_overpayment: Option<f64>,
    wrapper: Option<ApiWrapper>,

    investment_return: Option<f64>,
    investment_volatility: Option<f64>,
    inflation_rate: Option<f64>,
    inflation_volatility: Option<f64>,

    iterations: Option<u32>,
    seed: Option<u64>,
    sweep_iterations: Option<u32>,
    with_series: Option<bool>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "loanwise",
    about = "Monte Carlo comparison of overpaying a Plan 2 student loan versus investing the money"
)]
struct Cli {
    #[arg(long, default_value_t = 45_000.0, help = "Outstanding loan balance (GBP)")]
    loan_balance: f64,
    #[arg(long, default_value_t = 35_000.0, help = "Gross annual salary (GBP)")]
    salary: f64,
    #[arg(long, default_value_t = 4.0, help = "Expected annual salary growth (%)")]
    salary_growth: f64,
    #[arg(long, default_value_t = 25)]
    current_age: u32,
    #[arg(long, default_value_t = 1, help = "Years since the first repayment was due (0-29)")]
    years_since_first_repayment: u32,
    #[arg(long, default_value = "england", help = "england or scotland")]
    region: String,
    #[arg(long, default_value_t = 200.0, help = "Monthly overpayment or investment (GBP)")]
    monthly_overpayment: f64,
    #[arg(long, value_enum, default_value_t = CliWrapper::Isa)]
    wrapper: CliWrapper,
    #[arg(long, default_value_t = 7.0, help = "Expected nominal investment return (%)")]
    investment_return: f64,
    #[arg(long, default_value_t = 15.0, help = "Investment return volatility (%)")]
    investment_volatility: f64,
    #[arg(long, default_value_t = 3.2, help = "Expected RPI inflation (%)")]
    inflation_rate: f64,
    #[arg(long, default_value_t = 1.5, help = "RPI inflation volatility (%)")]
    inflation_volatility: f64,
    #[arg(long, default_value_t = 10_000)]
    iterations: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = SWEEP_ITERATIONS, help = "Iterations per sweep cell")]
    sweep_iterations: u32,
    #[arg(long, help = "Include per-year medians for both strategies")]
    with_series: bool,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: SimulationInputs,
    sweep_iterations: u32,
    with_series: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    inputs: SimulationInputs,
    summary: SimulationSummary,
    breakeven: BreakevenResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<YearlyMedians>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: &Cli) -> Result<SimulationInputs, String> {
    if cli.iterations == 0 {
        return Err("--iterations must be > 0".to_string());
    }

    if cli.sweep_iterations == 0 {
        return Err("--sweep-iterations must be > 0".to_string());
    }

    if cli.current_age > 120 {
        return Err("--current-age must be <= 120".to_string());
    }

    let region = cli
        .region
        .parse::<Region>()
        .map_err(|e: InputError| e.to_string())?;

    SimulationInputs::new(SimulationParams {
        loan_balance: cli.loan_balance,
        salary: cli.salary,
        salary_growth_mean: cli.salary_growth / 100.0,
        current_age: cli.current_age,
        years_since_first_repayment: cli.years_since_first_repayment,
        region,
        monthly_overpayment: cli.monthly_overpayment,
        wrapper: cli.wrapper.into(),
        return_mean: cli.investment_return / 100.0,
        return_vol: cli.investment_volatility / 100.0,
        inflation_mean: cli.inflation_rate / 100.0,
        inflation_vol: cli.inflation_volatility / 100.0,
        iterations: cli.iterations,
        seed: cli.seed,
    })
    .map_err(|e| e.to_string())
}

fn run_simulate(request: &ApiRequest) -> Result<SimulateResponse, String> {
    let inputs = &request.inputs;
    let results = run_simulation(inputs).map_err(|e| e.to_string())?;
    let breakeven = breakeven_table(inputs).map_err(|e| e.to_string())?;
    let summary = summarise(&UkTaxOracle, inputs, &results, &breakeven);
    info!(
        winner = %summary.winner,
        advantage = summary.advantage,
        breakeven = ?breakeven.breakeven_amount,
        "simulation complete"
    );

    Ok(SimulateResponse {
        inputs: *inputs,
        summary,
        series: request.with_series.then(|| yearly_medians(&results)),
        breakeven,
    })
}

fn run_sweep(request: &ApiRequest) -> Result<SweepResult, String> {
    parameter_sweep(&request.inputs, request.sweep_iterations, |progress| {
        if progress.completed % 21 == 0 || progress.completed == progress.total {
            info!(
                completed = progress.completed,
                total = progress.total,
                "sweep progress"
            );
        }
    })
    .map_err(|e| e.to_string())
}

/// One-shot CLI run: parses flags, prints nothing, returns the JSON document.
pub fn run_simulate_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;
    let request = api_request_from_cli(cli)?;
    let response = run_simulate(&request)?;
    serde_json::to_string_pretty(&response).map_err(|e| format!("Failed to encode result: {e}"))
}

pub fn run_sweep_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;
    let request = api_request_from_cli(cli)?;
    let response = run_sweep(&request)?;
    serde_json::to_string_pretty(&response).map_err(|e| format!("Failed to encode sweep: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/sweep", get(sweep_get_handler).post(sweep_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "loanwise HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn sweep_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    sweep_handler_impl(payload).await
}

async fn sweep_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    sweep_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match tokio::task::spawn_blocking(move || run_simulate(&request)).await {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            warn!(error = %e, "simulation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

async fn sweep_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match tokio::task::spawn_blocking(move || run_sweep(&request)).await {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            warn!(error = %e, "sweep task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Sweep failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_cli(cli: Cli) -> Result<ApiRequest, String> {
    let inputs = build_inputs(&cli)?;
    Ok(ApiRequest {
        inputs,
        sweep_iterations: cli.sweep_iterations,
        with_series: cli.with_series,
    })
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.loan_balance {
        cli.loan_balance = v;
    }
    if let Some(v) = payload.salary {
        cli.salary = v;
    }
    if let Some(v) = payload.salary_growth {
        cli.salary_growth = v;
    }
    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.years_since_first_repayment {
        cli.years_since_first_repayment = v;
    }
    if let Some(v) = payload.region {
        cli.region = v;
    }
    if let Some(v) = payload.monthly_overpayment {
        cli.monthly_overpayment = v;
    }
    if let Some(v) = payload.wrapper {
        cli.wrapper = v.into();
    }
    if let Some(v) = payload.investment_return {
        cli.investment_return = v;
    }
    if let Some(v) = payload.investment_volatility {
        cli.investment_volatility = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.inflation_volatility {
        cli.inflation_volatility = v;
    }
    if let Some(v) = payload.iterations {
        cli.iterations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.sweep_iterations {
        cli.sweep_iterations = v;
    }
    if let Some(v) = payload.with_series {
        cli.with_series = v;
    }

    api_request_from_cli(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        loan_balance: 45_000.0,
        salary: 35_000.0,
        salary_growth: 4.0,
        current_age: 25,
        years_since_first_repayment: 1,
        region: "england".to_string(),
        monthly_overpayment: 200.0,
        wrapper: CliWrapper::Isa,
        investment_return: 7.0,
        investment_volatility: 15.0,
        inflation_rate: 3.2,
        inflation_volatility: 1.5,
        iterations: 10_000,
        seed: 42,
        sweep_iterations: SWEEP_ITERATIONS,
        with_series: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Strategy;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    #[test]
    fn clap_defaults_match_api_defaults() {
        let parsed = Cli::parse_from(["loanwise"]);
        let defaults = sample_cli();
        assert_approx(parsed.loan_balance, defaults.loan_balance);
        assert_approx(parsed.inflation_rate, defaults.inflation_rate);
        assert_eq!(parsed.region, defaults.region);
        assert_eq!(parsed.wrapper, defaults.wrapper);
        assert_eq!(parsed.iterations, defaults.iterations);
        assert_eq!(parsed.sweep_iterations, 500);
        assert!(!parsed.with_series);
    }

    #[test]
    fn build_inputs_converts_percentages_to_fractions() {
        let inputs = build_inputs(&sample_cli()).expect("defaults are valid");
        assert_approx(inputs.salary_growth_mean(), 0.04);
        assert_approx(inputs.return_mean(), 0.07);
        assert_approx(inputs.return_vol(), 0.15);
        assert_approx(inputs.inflation_mean(), 0.032);
        assert_approx(inputs.inflation_vol(), 0.015);
        assert_eq!(inputs.remaining_years(), 29);
        assert_eq!(inputs.region(), Region::England);
        assert_eq!(inputs.wrapper(), Wrapper::Isa);
    }

    #[test]
    fn build_inputs_rejects_unknown_region() {
        let mut cli = sample_cli();
        cli.region = "wales".to_string();
        let err = build_inputs(&cli).expect_err("wales is not modelled");
        assert!(err.contains("region"), "{err}");
    }

    #[test]
    fn build_inputs_rejects_loan_below_minimum() {
        let mut cli = sample_cli();
        cli.loan_balance = 10_000.0;
        let err = build_inputs(&cli).expect_err("loan below minimum");
        assert!(err.contains("25000"), "{err}");
    }

    #[test]
    fn build_inputs_rejects_write_off_already_reached() {
        let mut cli = sample_cli();
        cli.years_since_first_repayment = 30;
        assert!(build_inputs(&cli).is_err());
    }

    #[test]
    fn build_inputs_rejects_zero_sweep_iterations() {
        let mut cli = sample_cli();
        cli.sweep_iterations = 0;
        assert_eq!(
            build_inputs(&cli).expect_err("zero sweep iterations"),
            "--sweep-iterations must be > 0"
        );
    }

    #[test]
    fn api_request_from_json_parses_web_keys() {
        let json = r#"{
          "loanBalance": 60000,
          "salary": 52000,
          "salaryGrowth": 3,
          "currentAge": 30,
          "yearsSinceFirstRepayment": 4,
          "region": "Scotland",
          "monthlyOverpayment": 350,
          "wrapper": "GIA",
          "investmentReturn": 6,
          "inflationRate": 2.5,
          "iterations": 1234,
          "seed": 7,
          "sweepIterations": 100,
          "withSeries": true
        }"#;
        let request = api_request_from_json(json).expect("json should parse");
        let inputs = request.inputs;

        assert_approx(inputs.loan_balance(), 60_000.0);
        assert_approx(inputs.salary(), 52_000.0);
        assert_approx(inputs.salary_growth_mean(), 0.03);
        assert_eq!(inputs.current_age(), 30);
        assert_eq!(inputs.remaining_years(), 26);
        assert_eq!(inputs.region(), Region::Scotland);
        assert_approx(inputs.monthly_overpayment(), 350.0);
        assert_eq!(inputs.wrapper(), Wrapper::Gia);
        assert_approx(inputs.return_mean(), 0.06);
        assert_approx(inputs.return_vol(), 0.15);
        assert_approx(inputs.inflation_mean(), 0.025);
        assert_eq!(inputs.iterations(), 1234);
        assert_eq!(inputs.seed(), 7);
        assert_eq!(request.sweep_iterations, 100);
        assert!(request.with_series);
    }

    #[test]
    fn api_request_from_json_rejects_unknown_wrapper() {
        let err = api_request_from_json(r#"{"wrapper": "pension"}"#).expect_err("bad wrapper");
        assert!(err.starts_with("Invalid API JSON payload"), "{err}");
    }

    #[test]
    fn simulate_response_serialization_contains_expected_fields() {
        let request = api_request_from_json(r#"{"iterations": 200, "withSeries": true}"#)
            .expect("json should parse");
        let response = run_simulate(&request).expect("simulation runs");
        assert_eq!(response.breakeven.rows.len(), 11);
        assert!(matches!(
            response.summary.winner,
            Strategy::Overpay | Strategy::Invest
        ));

        let json = serde_json::to_value(&response).expect("serialise");
        for key in ["inputs", "summary", "breakeven", "series"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["inputs"]["loanBalance"], 45_000.0);
        assert_eq!(json["summary"]["remainingYears"], 29);
        assert!(json["summary"]["winner"] == "A" || json["summary"]["winner"] == "B");
        assert_eq!(json["breakeven"]["rows"][0]["monthlyOverpayment"], 0.0);
        assert_eq!(json["series"]["years"].as_array().map(Vec::len), Some(30));
    }

    #[test]
    fn series_omitted_unless_requested() {
        let request =
            api_request_from_json(r#"{"iterations": 50}"#).expect("json should parse");
        let response = run_simulate(&request).expect("simulation runs");
        let json = serde_json::to_value(&response).expect("serialise");
        assert!(json.get("series").is_none());
    }

    #[test]
    fn bad_flags_come_back_as_errors() {
        let err = run_simulate_cli(["loanwise", "--iterations", "abc"])
            .expect_err("non-numeric iterations");
        assert!(err.contains("abc"), "{err}");

        let err = run_sweep_cli(["loanwise", "--no-such-flag"]).expect_err("unknown flag");
        assert!(err.contains("--no-such-flag"), "{err}");
    }
}
