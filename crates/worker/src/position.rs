//! Incremental position resolution.

use pipeline_core::{
    is_epoch, Backend, DocumentStore, EnrichContext, Position, ResumeMode, Result,
};
use tracing::{debug, warn};

/// Computes where an enrichment run should resume.
///
/// Returns `None` for a full run: when `no_incremental` is set or nothing
/// has been enriched yet. Live backends are resolved per origin, since raw
/// and enriched indexes may hold several sources.
pub async fn resolve_position(
    backend: Option<&dyn Backend>,
    ctx: &EnrichContext,
    store: &dyn DocumentStore,
    enrich_index: &str,
    no_incremental: bool,
) -> Result<Option<Position>> {
    if no_incremental {
        debug!(index = %enrich_index, "Incremental enrichment disabled");
        return Ok(None);
    }

    let position = match backend {
        Some(backend) => resolve_live(backend, ctx, store, enrich_index).await?,
        None => resolve_stored(ctx, store, enrich_index).await?,
    };

    debug!(index = %enrich_index, position = ?position, "Last enrichment");
    Ok(position)
}

async fn resolve_live(
    backend: &dyn Backend,
    ctx: &EnrichContext,
    store: &dyn DocumentStore,
    enrich_index: &str,
) -> Result<Option<Position>> {
    let origin = Some(backend.origin());
    let args = ctx.params.fetch_args()?;

    match backend.capabilities(false).resume_mode() {
        ResumeMode::ByTimestamp => {
            if let Some(from_date) = args.from_date.filter(|ts| !is_epoch(ts)) {
                return Ok(Some(Position::Timestamp(from_date)));
            }
            if let Some(last) = ctx.last_enrich_date {
                return Ok(Some(Position::Timestamp(last)));
            }
            let latest = store.latest_enriched_timestamp(enrich_index, origin).await?;
            Ok(latest.map(Position::Timestamp))
        }
        ResumeMode::ByOffset => {
            if let Some(offset) = args.offset.filter(|offset| *offset != 0) {
                return Ok(Some(Position::Offset(offset)));
            }
            let latest = store.latest_enriched_offset(enrich_index, origin).await?;
            Ok(latest.map(Position::Offset))
        }
        ResumeMode::None => {
            if let Some(last) = ctx.last_enrich_date {
                return Ok(Some(Position::Timestamp(last)));
            }
            let latest = store.latest_enriched_timestamp(enrich_index, origin).await?;
            Ok(latest.map(Position::Timestamp))
        }
    }
}

/// Enrich-only sources have no live backend to ask.
///
/// A readable `--from-date` param overrides whatever was stored; an
/// unreadable one is ignored.
async fn resolve_stored(
    ctx: &EnrichContext,
    store: &dyn DocumentStore,
    enrich_index: &str,
) -> Result<Option<Position>> {
    match ctx.params.from_date() {
        Ok(Some(from_date)) => return Ok(Some(Position::Timestamp(from_date))),
        Ok(None) => {}
        Err(e) => warn!(index = %enrich_index, error = %e, "Ignoring --from-date param"),
    }
    if let Some(last) = ctx.last_enrich_date {
        return Ok(Some(Position::Timestamp(last)));
    }
    let latest = store.latest_enriched_timestamp(enrich_index, None).await?;
    Ok(latest.map(Position::Timestamp))
}
