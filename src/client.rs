//! Display Configuration Client
//!
//! [`DisplayConfigClient`] owns the compositor connection, the tracked outputs
//! and the mode cache that the C entry points used to keep in globals.
//!
//! # Mode cache
//!
//! [`DisplayConfigClient::query_modes`] asks every output for its mode list
//! in turn. Each answer overwrites the shared cache, so after a query the
//! cache holds the list of the last output iterated. Per-output answers are
//! also kept and available through [`DisplayConfigClient::output_modes`].
//!
//! [`DisplayConfigClient::set_mode`] only ever selects from the shared cache.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::backend::ConfigBackend;
use crate::config::Config;
use crate::error::{DisplayConfigError, Result};
use crate::output::{OutputId, OutputInfo};
use crate::wayland::WaylandBackend;
use crate::wire::{HdmiInfo, HdmiInfos, ModeList, ModeRequest};

/// Context object for querying and switching HDMI modes
pub struct DisplayConfigClient<B: ConfigBackend = WaylandBackend> {
    backend: B,
    cache: HdmiInfos,
    per_output: HashMap<OutputId, HdmiInfos>,
}

impl DisplayConfigClient<WaylandBackend> {
    /// Connect to the compositor and bind the display configuration extension
    pub fn connect(config: &Config) -> Result<Self> {
        let backend = WaylandBackend::connect(config)?;
        Ok(Self::with_backend(backend))
    }
}

impl<B: ConfigBackend> DisplayConfigClient<B> {
    /// Wrap an already connected backend
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            cache: HdmiInfos::default(),
            per_output: HashMap::new(),
        }
    }

    /// Currently tracked outputs
    pub fn outputs(&self) -> Vec<OutputInfo> {
        self.backend.outputs()
    }

    /// Query the mode list of every output
    ///
    /// Returns the refreshed cache, which holds a byte-for-byte copy of the
    /// last output's answer. Outputs unplugged while the query runs are
    /// skipped; it fails with [`DisplayConfigError::NoOutputs`] only when none
    /// answered.
    pub fn query_modes(&mut self) -> Result<&HdmiInfos> {
        let outputs = self.backend.outputs();
        if outputs.is_empty() {
            return Err(DisplayConfigError::NoOutputs);
        }

        let mut answered = Vec::with_capacity(outputs.len());
        for output in &outputs {
            let infos = match self.query_output(output.id) {
                Ok(infos) => infos,
                Err(DisplayConfigError::UnknownOutput(_)) => {
                    warn!("{} went away during the mode query, skipping", output.id);
                    self.per_output.remove(&output.id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!(
                "{} ({}) reported {} HDMI modes",
                output.id,
                output.geometry.description(),
                infos.count
            );

            self.cache = infos;
            self.per_output.insert(output.id, infos);
            answered.push(output.id);
        }

        match answered.last() {
            None => Err(DisplayConfigError::NoOutputs),
            Some(last) => {
                if answered.len() > 1 {
                    debug!(
                        "Mode cache holds {} after querying {} outputs",
                        last,
                        answered.len()
                    );
                }
                Ok(&self.cache)
            }
        }
    }

    fn query_output(&mut self, output: OutputId) -> Result<HdmiInfos> {
        let request = self.backend.request_modes(output)?;
        self.backend.wait(request)?;
        self.backend.read_modes(output)
    }

    /// Mode list from the most recent query (empty before the first one)
    pub fn cached_modes(&self) -> &HdmiInfos {
        &self.cache
    }

    /// Cached mode list as a growable sequence
    pub fn mode_list(&self) -> ModeList {
        ModeList::from(&self.cache)
    }

    /// Last mode list a specific output reported
    pub fn output_modes(&self, output: OutputId) -> Option<&HdmiInfos> {
        self.per_output.get(&output)
    }

    /// Switch every output to the cached mode matching `request`
    ///
    /// Matching is exact on width, height, refresh and interlace flag. When
    /// nothing matches no request is sent. The same descriptor is applied to
    /// all outputs and the call returns once every output acknowledged it.
    pub fn set_mode(&mut self, request: &ModeRequest) -> Result<HdmiInfo> {
        let outputs = self.backend.outputs();
        if outputs.is_empty() {
            return Err(DisplayConfigError::NoOutputs);
        }

        let mode = self
            .cache
            .modes()
            .iter()
            .find(|mode| mode.matches(request))
            .copied()
            .ok_or_else(|| {
                warn!(
                    "No cached mode matches {} ({} cached)",
                    request,
                    self.cache.valid_len()
                );
                DisplayConfigError::ModeNotFound {
                    width: request.width,
                    height: request.height,
                    refresh: request.refresh,
                    interlaced: request.interlaced,
                }
            })?;

        let mut last = None;
        for output in &outputs {
            info!("Setting {} to {}", output.id, mode);
            last = Some(self.backend.request_set_mode(output.id, &mode)?);
        }

        if let Some(request) = last {
            self.backend.wait(request)?;
        }

        Ok(mode)
    }

    /// Release the connection, outputs and buffers
    pub fn close(self) {
        debug!(
            "Closing display configuration client ({} cached modes)",
            self.cache.valid_len()
        );
        drop(self);
    }

    /// Underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Underlying backend, mutable
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
