//! Station registry and lifecycle.
//!
//! Stations are created lazily when their first viewer arrives and torn down
//! when the last one leaves. Creation synchronizes the station to its
//! wall-clock anchor and spawns the two engine tasks; teardown raises the
//! stop signal and lets the engines flush themselves.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

use airwave_db::pool::{get_conn, DbPool};
use airwave_db::queries::{stations, videos};

use crate::config::PlayoutConfig;
use crate::engine::{ChunkTranscoder, DeliveryEngine, ProductionEngine};
use crate::sink::MediaSink;
use crate::station::clock::{sync_position, RotationEntry};
use crate::station::state::Station;

pub struct StationManager {
    stations: DashMap<String, Arc<Station>>,
    pool: DbPool,
    transcoder: Arc<dyn ChunkTranscoder>,
    config: Arc<PlayoutConfig>,
}

impl StationManager {
    pub fn new(
        pool: DbPool,
        transcoder: Arc<dyn ChunkTranscoder>,
        config: Arc<PlayoutConfig>,
    ) -> Self {
        Self {
            stations: DashMap::new(),
            pool,
            transcoder,
            config,
        }
    }

    /// Register a viewer. The first viewer of a station creates it: position
    /// is synchronized to the station's wall-clock anchor and both engines
    /// start; the viewer's sink becomes the station's output.
    pub fn viewer_joined(
        &self,
        name: &str,
        sink: Arc<dyn MediaSink>,
    ) -> anyhow::Result<Arc<Station>> {
        match self.stations.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let station = Arc::clone(entry.get());
                station.lock().viewers += 1;
                Ok(station)
            }
            Entry::Vacant(entry) => {
                let station = self.bootstrap(name)?;
                station.lock().viewers = 1;
                self.spawn_engines(&station, sink);
                entry.insert(Arc::clone(&station));
                info!(station = name, "station started");
                Ok(station)
            }
        }
    }

    /// Deregister a viewer. The last viewer's departure stops the engines
    /// and removes the station; a fresh stop token is issued on restart.
    pub fn viewer_left(&self, name: &str) {
        let mut stopped = false;
        if let Some(station) = self.stations.get(name) {
            let mut state = station.lock();
            state.viewers = state.viewers.saturating_sub(1);
            if state.viewers == 0 {
                station.raise_stop();
                stopped = true;
            }
        }
        if stopped {
            self.stations.remove(name);
            info!(station = name, "last viewer left, station stopped");
        }
    }

    /// A dropped transport connection counts as the viewer leaving.
    pub fn connection_lost(&self, name: &str) {
        self.viewer_left(name);
    }

    pub fn active_stations(&self) -> Vec<String> {
        self.stations.iter().map(|e| e.key().clone()).collect()
    }

    pub fn viewer_count(&self, name: &str) -> u32 {
        self.stations
            .get(name)
            .map(|s| s.lock().viewers)
            .unwrap_or(0)
    }

    /// Load a station from the metadata store and synchronize its position.
    fn bootstrap(&self, name: &str) -> anyhow::Result<Arc<Station>> {
        let conn = get_conn(&self.pool)?;
        let row = stations::get_station(&conn, name)?;
        let rotation_ids = stations::rotation(&conn, name)?;

        // Commercial-tagged or unprobed videos cannot be scheduled as
        // program content; drop them from the playable rotation.
        let mut entries = Vec::new();
        for id in &rotation_ids {
            let video = videos::get_video(&conn, id)?;
            let Some(duration_secs) = video.duration_secs else {
                warn!(station = name, video = %id, "skipping unprobed rotation video");
                continue;
            };
            if videos::video_has_tag(&conn, id, &self.config.commercial_tag)? {
                warn!(station = name, video = %id, "skipping commercial-tagged rotation video");
                continue;
            }
            entries.push(RotationEntry {
                id: id.clone(),
                duration_secs,
                is_ad: false,
            });
        }

        let now = Utc::now().timestamp();
        let (index, offset) = sync_position(&entries, row.unix_start, now)
            .ok_or_else(|| anyhow::anyhow!("station {name} has no playable rotation"))?;

        let rotation: Vec<String> = entries.into_iter().map(|e| e.id).collect();
        let station = Arc::new(Station::new(name, rotation, index, offset)?);

        // Breaks behind the join position already happened in broadcast
        // time; mark them spent so they never fire retroactively.
        if offset > 0.0 {
            station.lock().last_break_time = Some(offset);
        }

        Ok(station)
    }

    fn spawn_engines(&self, station: &Arc<Station>, sink: Arc<dyn MediaSink>) {
        let stop = station.reissue_stop();

        let production = ProductionEngine::new(
            Arc::clone(station),
            self.pool.clone(),
            Arc::clone(&self.transcoder),
            Arc::clone(&self.config),
        );
        tokio::spawn(production.run(stop.clone()));

        let delivery = DeliveryEngine::new(Arc::clone(station), sink, Arc::clone(&self.config));
        tokio::spawn(delivery.run(stop));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::DiscardSink;
    use airwave_av::{ChunkOutput, ChunkRequest};
    use airwave_db::pool::init_memory_pool;
    use async_trait::async_trait;

    struct FailingTranscoder;

    #[async_trait]
    impl ChunkTranscoder for FailingTranscoder {
        async fn produce(
            &self,
            _request: &ChunkRequest,
        ) -> airwave_av::Result<ChunkOutput> {
            Err(airwave_av::Error::InvalidOutput("scripted failure".into()))
        }
    }

    fn seeded_manager() -> StationManager {
        let pool = init_memory_pool().unwrap();
        {
            let conn = pool.get().unwrap();
            stations::create_station(&conn, "one", 0).unwrap();
            for (id, duration) in [("a", 100.0), ("b", 50.0)] {
                videos::create_video(&conn, id, &format!("/media/{id}.mp4")).unwrap();
                videos::set_duration(&conn, id, duration).unwrap();
            }
            stations::set_rotation(&conn, "one", &["a", "b"]).unwrap();
        }
        StationManager::new(
            pool,
            Arc::new(FailingTranscoder),
            Arc::new(PlayoutConfig::default()),
        )
    }

    #[tokio::test]
    async fn viewer_lifecycle_creates_and_removes_station() {
        let manager = seeded_manager();
        assert!(manager.active_stations().is_empty());

        let station = manager
            .viewer_joined("one", Arc::new(DiscardSink::default()))
            .unwrap();
        assert_eq!(manager.viewer_count("one"), 1);
        assert!(!station.stop_token().is_cancelled());

        manager
            .viewer_joined("one", Arc::new(DiscardSink::default()))
            .unwrap();
        assert_eq!(manager.viewer_count("one"), 2);

        manager.viewer_left("one");
        assert_eq!(manager.viewer_count("one"), 1);
        assert!(!station.stop_token().is_cancelled());

        manager.viewer_left("one");
        assert!(manager.active_stations().is_empty());
        assert!(station.stop_token().is_cancelled());
    }

    #[tokio::test]
    async fn unknown_station_is_an_error() {
        let manager = seeded_manager();
        assert!(manager
            .viewer_joined("nope", Arc::new(DiscardSink::default()))
            .is_err());
        // A failed join leaves no residue.
        assert!(manager.active_stations().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_synchronizes_to_wall_clock() {
        let manager = seeded_manager();
        // unix_start=0 and a 150s program: position is deterministic modulo
        // the rotation, whatever "now" is.
        let station = manager
            .viewer_joined("one", Arc::new(DiscardSink::default()))
            .unwrap();
        let state = station.lock();
        assert!(state.index < 2);
        let limit = if state.index == 0 { 100.0 } else { 50.0 };
        assert!(state.current_offset >= 0.0 && state.current_offset < limit);
    }
}
