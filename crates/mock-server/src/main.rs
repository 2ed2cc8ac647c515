//! Local stand-in for the analytics service the desktop app talks to.
//!
//! Serves the same eight GET endpoints with deterministic seeded data, so
//! the app can be exercised offline. `--latency-ms` adds an artificial
//! delay to every response for poking at the loading overlays.

use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{Datelike, NaiveDate};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use warp::Filter;
use warp::http::StatusCode;

/// Mock analytics backend for dmscope development
#[derive(Parser, Debug)]
#[command(name = "mock-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8787)]
    port: u16,

    /// RNG seed; identical seeds produce identical datasets
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Artificial delay added to every response, in milliseconds
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Number of conversations reported by /conversation_count
    #[arg(long, default_value_t = 12)]
    conversations: u64,

    /// Answer accepted by /secret_message
    #[arg(long, default_value = "guillotine")]
    secret_answer: String,
}

struct MockState {
    seed: u64,
    conversations: u64,
    secret_answer: String,
    latency: Duration,
}

type State = Arc<MockState>;
type Query = HashMap<String, String>;

const WORD_POOL: &[&str] = &[
    "lol", "bro", "actually", "tomorrow", "haha", "fr", "class", "game", "song", "wait",
];

const SECRET_MESSAGE: &str = "Well solved. This dataset only exists because you kept \
messaging me, so thank you for a year of conversations worth analyzing.";

fn with_state(state: State) -> impl Filter<Extract = (State,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Stable per-key RNG: the same id and date range always see the same
/// numbers, across restarts with the same `--seed`.
fn rng_for(state: &MockState, key: &str) -> StdRng {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    StdRng::seed_from_u64(state.seed ^ hasher.finish())
}

async fn pace(state: &MockState) {
    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }
}

fn param<'q>(query: &'q Query, key: &str) -> &'q str {
    query.get(key).map(String::as_str).unwrap_or_default()
}

fn parse_date_or(value: &str, fallback: (i32, u32, u32)) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::from_ymd_opt(fallback.0, fallback.1, fallback.2))
        .unwrap_or_default()
}

/// Month labels covering the requested range, capped so a typo'd year
/// does not produce a thousand bars.
fn month_span(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut labels = Vec::new();
    let mut cursor = start.with_day(1).unwrap_or(start);
    while cursor <= end && labels.len() < 24 {
        labels.push(cursor.format("%Y-%m").to_string());
        cursor = match cursor.checked_add_months(chrono::Months::new(1)) {
            Some(next) => next,
            None => break,
        };
    }
    if labels.is_empty() {
        labels.push(start.format("%Y-%m").to_string());
    }
    labels
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

async fn conversation_count(state: State) -> Result<impl warp::Reply, Infallible> {
    pace(&state).await;
    Ok(warp::reply::json(&json!({
        "conversation_count": state.conversations,
    })))
}

async fn username_exists(query: Query, state: State) -> Result<impl warp::Reply, Infallible> {
    pace(&state).await;
    let username = param(&query, "username");
    // "aryan" is the special case that unlocks the riddle page
    let secret = username.eq_ignore_ascii_case("aryan");
    let exists =
        secret || (!username.is_empty() && rng_for(&state, &format!("user:{username}")).gen_bool(0.7));
    log::info!("username_exists({username}) -> exists={exists}, secret={secret}");
    Ok(warp::reply::json(&json!({
        "exists": if exists { "true" } else { "false" },
        "secret": if secret { "true" } else { "false" },
    })))
}

async fn secret_message(query: Query, state: State) -> Result<impl warp::Reply, Infallible> {
    pace(&state).await;
    let answer = param(&query, "secret");
    if answer.trim().eq_ignore_ascii_case(&state.secret_answer) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(SECRET_MESSAGE);
        Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "base64": encoded })),
            StatusCode::OK,
        ))
    } else {
        log::info!("secret_message: rejected answer");
        Ok(warp::reply::with_status(
            warp::reply::json(&json!({})),
            StatusCode::NOT_FOUND,
        ))
    }
}

/// Warm-up target. The app never reads this body.
async fn message_volume(_query: Query, state: State) -> Result<impl warp::Reply, Infallible> {
    pace(&state).await;
    Ok(warp::reply::json(&json!({})))
}

async fn word_cloud(query: Query, state: State) -> Result<impl warp::Reply, Infallible> {
    pace(&state).await;
    let id = param(&query, "id");
    let mut rng = rng_for(&state, &format!("words:{id}"));

    let mut counts: Vec<u64> = (0..5).map(|_| rng.gen_range(40..400)).collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));

    let mut pool: Vec<&str> = WORD_POOL.to_vec();
    let top_words: Vec<serde_json::Value> = counts
        .iter()
        .map(|count| {
            let word = pool.remove(rng.gen_range(0..pool.len()));
            json!({ "word": word, "count": count })
        })
        .collect();

    Ok(warp::reply::json(&json!({ "top_words": top_words })))
}

async fn message_volume_by_period(query: Query, state: State) -> Result<impl warp::Reply, Infallible> {
    pace(&state).await;
    let id = param(&query, "id");
    let start = parse_date_or(param(&query, "start_date"), (2024, 5, 1));
    let end = parse_date_or(param(&query, "end_date"), (2025, 5, 1));
    let labels = month_span(start, end);

    let mut rng = rng_for(&state, &format!("volume:{id}:{start}:{end}"));
    let counts: Vec<u64> = labels.iter().map(|_| rng.gen_range(20..900)).collect();

    Ok(warp::reply::json(&json!({
        "figure": {
            "data": [{
                "type": "bar",
                "x": labels,
                "y": counts,
                "marker": { "color": "#9333ea" },
            }],
            "layout": {
                "title": "Messages per month",
                "xaxis": { "title": "Month" },
                "yaxis": { "title": "Messages" },
            },
        },
    })))
}

async fn message_comparison(query: Query, state: State) -> Result<impl warp::Reply, Infallible> {
    pace(&state).await;
    let id = param(&query, "id");
    let start = parse_date_or(param(&query, "start_date"), (2024, 5, 1));
    let end = parse_date_or(param(&query, "end_date"), (2025, 5, 1));
    let labels = month_span(start, end);

    let mut rng = rng_for(&state, &format!("comparison:{id}:{start}:{end}"));
    let mine: Vec<u64> = labels.iter().map(|_| rng.gen_range(10..500)).collect();
    let theirs: Vec<u64> = labels.iter().map(|_| rng.gen_range(10..500)).collect();

    Ok(warp::reply::json(&json!({
        "figure": {
            "data": [
                {
                    "type": "bar",
                    "name": "Me",
                    "x": labels,
                    "y": mine,
                    "marker": { "color": "#2563eb" },
                },
                {
                    "type": "bar",
                    "name": format!("User_{id}"),
                    "x": labels,
                    "y": theirs,
                    "marker": { "color": "#9333ea" },
                },
            ],
            "layout": {
                "title": "Who sent more",
                "barmode": "group",
            },
        },
    })))
}

async fn average_response_time(query: Query, state: State) -> Result<impl warp::Reply, Infallible> {
    pace(&state).await;
    let id = param(&query, "id");
    let start = param(&query, "start_date");
    let end = param(&query, "end_date");

    let mut rng = rng_for(&state, &format!("response:{id}:{start}:{end}"));
    Ok(warp::reply::json(&json!({
        "avg_self": round1(rng.gen_range(30.0..900.0)),
        "median_self": round1(rng.gen_range(10.0..300.0)),
        "avg_unknown": round1(rng.gen_range(30.0..900.0)),
        "median_unknown": round1(rng.gen_range(10.0..300.0)),
    })))
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let state: State = Arc::new(MockState {
        seed: args.seed,
        conversations: args.conversations,
        secret_answer: args.secret_answer,
        latency: Duration::from_millis(args.latency_ms),
    });

    let count = warp::path!("conversation_count")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(conversation_count);
    let exists = warp::path!("username_exists")
        .and(warp::get())
        .and(warp::query::<Query>())
        .and(with_state(state.clone()))
        .and_then(username_exists);
    let secret = warp::path!("secret_message")
        .and(warp::get())
        .and(warp::query::<Query>())
        .and(with_state(state.clone()))
        .and_then(secret_message);
    let volume = warp::path!("message_volume")
        .and(warp::get())
        .and(warp::query::<Query>())
        .and(with_state(state.clone()))
        .and_then(message_volume);
    let words = warp::path!("word_cloud")
        .and(warp::get())
        .and(warp::query::<Query>())
        .and(with_state(state.clone()))
        .and_then(word_cloud);
    let by_period = warp::path!("message_volume_by_period")
        .and(warp::get())
        .and(warp::query::<Query>())
        .and(with_state(state.clone()))
        .and_then(message_volume_by_period);
    let comparison = warp::path!("message_comparison")
        .and(warp::get())
        .and(warp::query::<Query>())
        .and(with_state(state.clone()))
        .and_then(message_comparison);
    let response_time = warp::path!("average_response_time")
        .and(warp::get())
        .and(warp::query::<Query>())
        .and(with_state(state.clone()))
        .and_then(average_response_time);

    let routes = count
        .or(exists)
        .or(secret)
        .or(volume)
        .or(words)
        .or(by_period)
        .or(comparison)
        .or(response_time)
        .with(warp::log("mock_server"));

    log::info!(
        "🚀 Mock analytics service on http://127.0.0.1:{} ({} conversations, seed {})",
        args.port,
        args.conversations,
        args.seed
    );
    warp::serve(routes).run(([127, 0, 0, 1], args.port)).await;
}
