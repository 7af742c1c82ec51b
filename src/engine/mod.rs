//! Per-station playout engines.
//!
//! Two long-lived tasks run per active station: the production engine keeps a
//! small buffer of transcoded chunks ahead of the playhead, and the delivery
//! engine drains that buffer in real time. They share only the station lock
//! and the stop token.

pub mod deliver;
pub mod plan;
pub mod produce;

pub use deliver::DeliveryEngine;
pub use produce::ProductionEngine;

use async_trait::async_trait;

use airwave_av::{ChunkOutput, ChunkRequest, FfmpegTranscoder};

/// Chunk production seam between the engines and the transcoder process.
///
/// The production engine only needs this one call; tests substitute a
/// scripted implementation for it.
#[async_trait]
pub trait ChunkTranscoder: Send + Sync {
    async fn produce(&self, request: &ChunkRequest) -> airwave_av::Result<ChunkOutput>;
}

#[async_trait]
impl ChunkTranscoder for FfmpegTranscoder {
    async fn produce(&self, request: &ChunkRequest) -> airwave_av::Result<ChunkOutput> {
        FfmpegTranscoder::produce(self, request).await
    }
}
