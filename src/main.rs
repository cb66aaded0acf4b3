// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Showcase binary: a handful of pipelines over mock sources.

use std::time::Duration;

use anyhow::Result;

use tapline::context::QueryContext;
use tapline::functions::arithmetic::round_up;
use tapline::functions::items::item_with_max;
use tapline::functions::{callback, comparison, statistics};
use tapline::item::{Field, Item, TIME_CREATED};
use tapline::purpose::Purpose;
use tapline::source::mock::{FixedSource, MockSensor, READING};

const CONTACT: Field<String> = Field::new("contact");
const CALLS: Field<i64> = Field::new("#calls");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ctx = QueryContext::new();

    reuse_showcase(&ctx).await?;
    grouping_showcase(&ctx).await?;
    batching_showcase(&ctx).await?;
    debug_showcase(&ctx).await?;

    println!("\nactive executions at exit: {}", ctx.registry().active_count());
    ctx.stop_all();
    Ok(())
}

/// One sensor execution fanned out to three independent consumers.
async fn reuse_showcase(ctx: &QueryContext) -> Result<()> {
    println!("== multicast reuse ==");
    let shared = ctx
        .get_data(
            MockSensor::bounded(100, 10.0),
            Purpose::test("compute once, consume three times"),
        )
        .limit(100)
        .reuse(3)?;

    let total = shared.branch()?.count().await?;
    let high = shared
        .branch()?
        .filter(comparison::gt(READING, 5.0))
        .count()
        .await?;
    let low = shared
        .branch()?
        .filter(comparison::lte(READING, 5.0))
        .count()
        .await?;
    println!("total={total} high={high} low={low}");
    Ok(())
}

/// Global grouping: bucket a bounded call log, reduce, pick the winner.
async fn grouping_showcase(ctx: &QueryContext) -> Result<()> {
    println!("\n== most-called contact ==");
    let handle = ctx
        .get_data(
            FixedSource::new(call_log()),
            Purpose::social("finding your closest contact"),
        )
        .group_by(CONTACT.name())
        .set_group_field(CALLS.name(), statistics::count())?
        .select(item_with_max(CALLS))?
        .if_present(
            CONTACT,
            callback(
                |contact: String| println!("most-called contact: {contact}"),
                |error| println!("no contact found: {error}"),
            ),
        );
    handle.await?;
    Ok(())
}

/// Incremental batching of a live stream into time buckets.
async fn batching_showcase(ctx: &QueryContext) -> Result<()> {
    println!("\n== incremental batching ==");
    let batches = ctx
        .get_data(
            MockSensor::updates(Duration::from_millis(20), 1.0),
            Purpose::health("batching readings per time bucket"),
        )
        .limit(12)
        .timeout(Duration::from_secs(5))
        .set_field("bucket", round_up(TIME_CREATED, 100))
        .local_group_by("bucket")
        .set_group_field("size", statistics::count())?
        .collect()
        .await?;
    for batch in &batches {
        println!(
            "bucket {:?} -> {:?} readings",
            batch.get_value("bucket"),
            batch.get_value("size")
        );
    }
    Ok(())
}

/// The inspection sink: connect with any TCP client to watch tagged items.
async fn debug_showcase(ctx: &QueryContext) -> Result<()> {
    println!("\n== debug sink ==");
    let addr = ctx.debug_server().ensure_started().await?;
    println!("debug sink listening on {addr}");
    ctx.get_data(MockSensor::bounded(3, 1.0), Purpose::test("inspection"))
        .log_as("showcase")
        .count()
        .await?;
    Ok(())
}

fn call_log() -> Vec<Item> {
    let mut log = Vec::new();
    for contact in ["ana", "bo", "ana", "cy", "ana", "bo"] {
        log.push(Item::new().with_field(CONTACT.name(), contact));
    }
    log
}
