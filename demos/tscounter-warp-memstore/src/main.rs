#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

use serde::Serialize;
use slog::Drain;
use slog::info;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use structopt::StructOpt;
use tscounter::{Config, Exponential, MemStore, TimeSeriesCounter};
use warp::{Filter, reply};

type Counter = TimeSeriesCounter<Arc<MemStore>>;

#[derive(Debug, StructOpt)]
struct Options {
    #[structopt(long, default_value = "0.0.0.0:8081")]
    web_server: String,
    #[structopt(long, default_value = "")]
    prefix: String,
    //Ranking window, in minutes
    #[structopt(long, default_value = "120")]
    window: u64,
    //Bucket width, in minutes
    #[structopt(long, default_value = "5")]
    bucket: u64,
    #[structopt(long, default_value = "0.714")]
    gravity: f64,
}

#[derive(Serialize)]
struct Incremented {
    member: String,
    count: f64,
    bucket: i64,
}

fn with_counter(
    counter: Arc<Counter>,
) -> impl Filter<Extract=(Arc<Counter>, ), Error=Infallible> + Clone {
    warp::any().map(move || counter.clone())
}

async fn incr(
    counter: Arc<Counter>,
    member: String,
    amount: f64,
) -> Result<impl warp::Reply, Infallible> {
    match counter.incr_count_with_bucket(&member, amount).await {
        Ok((bucket, count)) => Ok(reply::json(&Incremented {
            member,
            count,
            bucket,
        })),
        Err(e) => Ok(reply::json(&format!("incr error, {:?}", e))),
    }
}

async fn bucket(
    counter: Arc<Counter>,
    index: i64,
    how_many: usize,
) -> Result<impl warp::Reply, Infallible> {
    match counter.get_bucket_count(index, how_many).await {
        Ok(members) => Ok(reply::json(&members)),
        Err(e) => Ok(reply::json(&format!("bucket error, {:?}", e))),
    }
}

async fn ranking(
    counter: Arc<Counter>,
    window: Option<u64>,
    how_many: usize,
) -> Result<impl warp::Reply, Infallible> {
    let window = window.unwrap_or(counter.config().total_time_width);
    match counter.get_ranking(window, how_many).await {
        Ok(members) => Ok(reply::json(&members)),
        Err(e) => Ok(reply::json(&format!("ranking error, {:?}", e))),
    }
}

// curl "http://127.0.0.1:8081/incr/apple/1"
// curl "http://127.0.0.1:8081/bucket/5666667/10"
// curl "http://127.0.0.1:8081/ranking/10"
// curl "http://127.0.0.1:8081/ranking/30/10"

// ab -n 50000 -c 100 "http://127.0.0.1:8081/incr/apple/1"

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = slog::Logger::root(drain, slog_o!("version" => env!("CARGO_PKG_VERSION")));

    // converts log to slog
    let _scope_guard = slog_scope::set_global_logger(logger.clone());
    slog_stdlog::init()?;

    let options = Options::from_args();
    info!(logger, "options: {:?}", options);
    let cfg = Config {
        decay: Arc::new(Exponential::new(options.gravity)?),
        ..Config::new(options.prefix, options.window, options.bucket)
    };
    let counter = Arc::new(TimeSeriesCounter::new(Arc::new(MemStore::new()), cfg)?);

    let incr_count = warp::get()
        .and(warp::path!("incr" / String / f64))
        .and(with_counter(counter.clone()))
        .and_then(|member, amount, counter: Arc<Counter>| incr(counter, member, amount));

    let bucket_count = warp::get()
        .and(warp::path!("bucket" / i64 / usize))
        .and(with_counter(counter.clone()))
        .and_then(|index, how_many, counter: Arc<Counter>| bucket(counter, index, how_many));

    let default_ranking = warp::get()
        .and(warp::path!("ranking" / usize))
        .and(with_counter(counter.clone()))
        .and_then(|how_many, counter: Arc<Counter>| ranking(counter, None, how_many));

    let window_ranking = warp::get()
        .and(warp::path!("ranking" / u64 / usize))
        .and(with_counter(counter.clone()))
        .and_then(|window, how_many, counter: Arc<Counter>| {
            ranking(counter, Some(window), how_many)
        });

    let routes = incr_count
        .or(bucket_count)
        .or(default_ranking)
        .or(window_ranking);

    let addr = SocketAddr::from_str(&options.web_server)?;
    info!(logger, "listening on {}", addr);
    warp::serve(routes).run(addr).await;
    Ok(())
}
