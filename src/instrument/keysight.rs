//! Keysight InfiniiVision oscilloscope driver.
//!
//! Wraps a [`ScpiAdapter`] and exposes the scope's trigger, channel,
//! timebase and waveform subsystems as typed operations. Every command is
//! followed by a `:SYSTem:ERRor?` check so instrument-side failures
//! surface as [`ScopeError::Instrument`] instead of silent bad state.
//!
//! The driver keeps a settings snapshot, taken at connect time and
//! refreshed after each configuration change. Writes are suppressed when
//! the requested value already matches the snapshot, keeping redundant
//! traffic off the bus.
//!
//! ## Configuration
//!
//! ```toml
//! log_level = "info"
//!
//! [scope]
//! resource = "TCPIP0::192.168.0.17::INSTR"
//! timeout_ms = 5000
//!
//! [capture]
//! points = 10240
//! source = "channel1"
//! ```

use anyhow::Result;
use chrono::Utc;
use log::{debug, info};

use crate::adapters::ScpiAdapter;
use crate::config::Settings;
use crate::error::ScopeError;
use crate::scpi::{self, Identity, SystemError};

use super::settings::{
    ChannelConfig, ChannelId, ChannelSettings, EdgeTriggerConfig, EdgeTriggerSettings,
    TimebaseConfig, TimebaseSettings, TriggerSettings,
};
use super::waveform::{ByteOrder, CaptureConfig, Preamble, Waveform};

const ERROR_QUERY: &str = ":SYSTem:ERRor?";

/// Driver for one Keysight InfiniiVision-class oscilloscope.
pub struct KeysightScope {
    adapter: Box<dyn ScpiAdapter>,
    identity: Identity,
    trigger: TriggerSettings,
    channels: [ChannelSettings; 4],
    timebase: TimebaseSettings,
    capture_defaults: CaptureConfig,
}

impl KeysightScope {
    /// Connect through the given adapter and take a full settings
    /// snapshot.
    pub async fn connect(mut adapter: Box<dyn ScpiAdapter>, settings: &Settings) -> Result<Self> {
        if !adapter.is_connected() {
            adapter.connect().await?;
        }
        info!("Connected via {}", adapter.info());

        let identity = Identity::parse(&Self::raw_query(adapter.as_mut(), "*IDN").await?)?;
        info!("Instrument: {identity}");

        let trigger = Self::read_trigger(adapter.as_mut()).await?;
        let channels = [
            Self::read_channel(adapter.as_mut(), ChannelId::Channel1).await?,
            Self::read_channel(adapter.as_mut(), ChannelId::Channel2).await?,
            Self::read_channel(adapter.as_mut(), ChannelId::Channel3).await?,
            Self::read_channel(adapter.as_mut(), ChannelId::Channel4).await?,
        ];
        let timebase = Self::read_timebase(adapter.as_mut()).await?;

        Ok(Self {
            adapter,
            identity,
            trigger,
            channels,
            timebase,
            capture_defaults: CaptureConfig {
                source: settings.capture.source,
                points: settings.capture.points,
                ..CaptureConfig::default()
            },
        })
    }

    /// Close the session.
    pub async fn close(mut self) -> Result<()> {
        info!("Disconnecting from {}", self.identity.model);
        self.adapter.disconnect().await
    }

    // ---------------------------------------------------------------------
    // Command plumbing
    // ---------------------------------------------------------------------

    /// Send a raw command and check the instrument error queue.
    pub async fn command(&mut self, command: &str) -> Result<()> {
        Self::raw_command(self.adapter.as_mut(), command).await
    }

    /// Send a raw query (the `?` is appended) and check the error queue.
    pub async fn query(&mut self, command: &str) -> Result<String> {
        Self::raw_query(self.adapter.as_mut(), command).await
    }

    async fn raw_command(adapter: &mut dyn ScpiAdapter, command: &str) -> Result<()> {
        debug!("Writing command '{command}'");
        adapter.send(command).await?;
        Self::check_errors(adapter, command).await
    }

    async fn raw_query(adapter: &mut dyn ScpiAdapter, command: &str) -> Result<String> {
        let response = adapter.query(&format!("{command}?")).await?;
        Self::check_errors(adapter, command).await?;
        Ok(response)
    }

    /// Hit the system error queue after a command or query. A non-zero
    /// code fails the operation; an empty reply means the session itself
    /// is broken.
    async fn check_errors(adapter: &mut dyn ScpiAdapter, command: &str) -> Result<()> {
        let raw = adapter.query(ERROR_QUERY).await?;
        if raw.trim().is_empty() {
            return Err(ScopeError::EmptyErrorQueue {
                command: command.to_string(),
            }
            .into());
        }
        let status = SystemError::parse(&raw)?;
        if status.is_ok() {
            return Ok(());
        }
        Err(ScopeError::Instrument {
            code: status.code,
            message: status.message,
            command: command.to_string(),
        }
        .into())
    }

    // ---------------------------------------------------------------------
    // Snapshot accessors
    // ---------------------------------------------------------------------

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn trigger_settings(&self) -> &TriggerSettings {
        &self.trigger
    }

    pub fn channel_settings(&self, channel: ChannelId) -> &ChannelSettings {
        &self.channels[channel.array_index()]
    }

    pub fn timebase_settings(&self) -> &TimebaseSettings {
        &self.timebase
    }

    /// Re-read the entire settings snapshot from the instrument.
    pub async fn refresh(&mut self) -> Result<()> {
        self.trigger = Self::read_trigger(self.adapter.as_mut()).await?;
        for channel in ChannelId::ALL {
            self.channels[channel.array_index()] =
                Self::read_channel(self.adapter.as_mut(), channel).await?;
        }
        self.timebase = Self::read_timebase(self.adapter.as_mut()).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Direct operations
    // ---------------------------------------------------------------------

    /// Force a trigger event.
    pub async fn force_trigger(&mut self) -> Result<()> {
        info!("Forcing trigger");
        self.command(":TRIGger:FORCe").await
    }

    /// Run the instrument's autoscale routine.
    pub async fn autoscale(&mut self) -> Result<()> {
        info!("Autoscaling");
        self.command(":AUToscale").await
    }

    // ---------------------------------------------------------------------
    // Trigger
    // ---------------------------------------------------------------------

    /// Configure the edge trigger. The mode is switched to EDGE when
    /// needed; each given field is written only if it differs from the
    /// snapshot. The trigger snapshot is refreshed afterwards.
    pub async fn setup_edge_trigger(&mut self, config: EdgeTriggerConfig) -> Result<()> {
        if !self.trigger.is_edge_mode() {
            Self::raw_command(self.adapter.as_mut(), ":TRIGger:MODE EDGE").await?;
        }

        if let Some(source) = config.source {
            if source != self.trigger.edge.source {
                let cmd = format!(":TRIGger:EDGE:SOURce {}", source.scpi());
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }
        if let Some(level) = config.level {
            if !approx_eq(level, self.trigger.edge.level) {
                let cmd = format!(":TRIGger:EDGE:LEVel {level}");
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }
        if let Some(coupling) = config.coupling {
            if coupling != self.trigger.edge.coupling {
                let cmd = format!(":TRIGger:EDGE:COUPling {}", coupling.scpi());
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }
        if let Some(slope) = config.slope {
            if slope != self.trigger.edge.slope {
                let cmd = format!(":TRIGger:EDGE:SLOPe {}", slope.scpi());
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }
        if let Some(reject) = config.reject {
            if reject != self.trigger.edge.reject {
                let cmd = format!(":TRIGger:EDGE:REJect {}", reject.scpi());
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }

        self.trigger = Self::read_trigger(self.adapter.as_mut()).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Vertical channels
    // ---------------------------------------------------------------------

    /// Configure a vertical channel; unchanged values are not written.
    /// The channel's snapshot is refreshed afterwards.
    pub async fn setup_channel(&mut self, channel: ChannelId, config: ChannelConfig) -> Result<()> {
        let current = self.channels[channel.array_index()].clone();

        if let Some(scale) = config.scale {
            if !approx_eq(scale, current.scale) {
                let cmd = format!(":{}:SCALe {scale}", channel.scpi());
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }
        if let Some(offset) = config.offset {
            if !approx_eq(offset, current.offset) {
                let cmd = format!(":{}:OFFSet {offset}", channel.scpi());
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }

        self.channels[channel.array_index()] =
            Self::read_channel(self.adapter.as_mut(), channel).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Timebase
    // ---------------------------------------------------------------------

    /// Configure the timebase; unchanged values are not written. The
    /// timebase snapshot is refreshed afterwards.
    pub async fn setup_timebase(&mut self, config: TimebaseConfig) -> Result<()> {
        if let Some(scale) = config.scale {
            if !approx_eq(scale, self.timebase.scale) {
                let cmd = format!(":TIMebase:SCALe {scale}");
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }
        if let Some(position) = config.position {
            if !approx_eq(position, self.timebase.position) {
                let cmd = format!(":TIMebase:POSition {position}");
                Self::raw_command(self.adapter.as_mut(), &cmd).await?;
            }
        }

        self.timebase = Self::read_timebase(self.adapter.as_mut()).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Waveform capture
    // ---------------------------------------------------------------------

    /// Capture a waveform from `source` with the configured defaults.
    pub async fn capture_waveform(&mut self, source: ChannelId) -> Result<Waveform> {
        let config = CaptureConfig {
            source,
            ..self.capture_defaults
        };
        self.capture_waveform_with(config).await
    }

    /// Capture a waveform with an explicit capture configuration.
    pub async fn capture_waveform_with(&mut self, config: CaptureConfig) -> Result<Waveform> {
        self.arm_capture(&config).await?;

        let preamble =
            Preamble::parse(&Self::raw_query(self.adapter.as_mut(), ":WAVeform:PREamble").await?)?;

        let raw = self.adapter.query_binary(":WAVeform:DATA?").await?;
        Self::check_errors(self.adapter.as_mut(), ":WAVeform:DATA?").await?;
        let data = scpi::parse_block(&raw)?.to_vec();

        debug!("Captured {} points from {}", data.len(), config.source);
        Ok(Waveform {
            source: config.source,
            captured_at: Utc::now(),
            preamble,
            data,
        })
    }

    async fn arm_capture(&mut self, config: &CaptureConfig) -> Result<()> {
        let cmd = format!(":WAVeform:POINts:MODE {}", config.points_mode.scpi());
        Self::raw_command(self.adapter.as_mut(), &cmd).await?;
        let cmd = format!(":WAVeform:POINts {}", config.points);
        Self::raw_command(self.adapter.as_mut(), &cmd).await?;
        let cmd = format!(":WAVeform:SOURce {}", config.source.scpi());
        Self::raw_command(self.adapter.as_mut(), &cmd).await?;
        let cmd = format!(":WAVeform:FORMat {}", config.format.scpi());
        Self::raw_command(self.adapter.as_mut(), &cmd).await?;
        Ok(())
    }

    /// Read the WORD-transfer byte order.
    pub async fn byte_order(&mut self) -> Result<ByteOrder> {
        let raw = self.query(":WAVeform:BYTeorder").await?;
        Ok(raw.parse()?)
    }

    /// Set the WORD-transfer byte order.
    pub async fn set_byte_order(&mut self, order: ByteOrder) -> Result<()> {
        self.command(&format!(":WAVeform:BYTeorder {}", order.scpi()))
            .await
    }

    // ---------------------------------------------------------------------
    // Snapshot readers
    // ---------------------------------------------------------------------

    async fn read_trigger(adapter: &mut dyn ScpiAdapter) -> Result<TriggerSettings> {
        let mode = Self::raw_query(adapter, ":TRIGger:MODE").await?.trim().to_string();
        let sweep = Self::raw_query(adapter, ":TRIGger:SWEep").await?.trim().to_string();
        let hf_reject = scpi::parse_bool(&Self::raw_query(adapter, ":TRIGger:HFReject").await?)?;
        let noise_reject = scpi::parse_bool(&Self::raw_query(adapter, ":TRIGger:NREJect").await?)?;
        let holdoff = scpi::parse_f64(&Self::raw_query(adapter, ":TRIGger:HOLDoff").await?)?;
        let holdoff_max =
            scpi::parse_f64(&Self::raw_query(adapter, ":TRIGger:HOLDoff:MAXimum").await?)?;
        let holdoff_min =
            scpi::parse_f64(&Self::raw_query(adapter, ":TRIGger:HOLDoff:MINimum").await?)?;
        let holdoff_random =
            scpi::parse_bool(&Self::raw_query(adapter, ":TRIGger:HOLDoff:RANDom").await?)?;

        let edge = EdgeTriggerSettings {
            source: Self::raw_query(adapter, ":TRIGger:EDGE:SOURce").await?.parse()?,
            level: scpi::parse_f64(&Self::raw_query(adapter, ":TRIGger:EDGE:LEVel").await?)?,
            coupling: Self::raw_query(adapter, ":TRIGger:EDGE:COUPling").await?.parse()?,
            slope: Self::raw_query(adapter, ":TRIGger:EDGE:SLOPe").await?.parse()?,
            reject: Self::raw_query(adapter, ":TRIGger:EDGE:REJect").await?.parse()?,
        };

        let settings = TriggerSettings {
            mode,
            sweep,
            hf_reject,
            noise_reject,
            holdoff,
            holdoff_max,
            holdoff_min,
            holdoff_random,
            edge,
        };
        debug!("Trigger snapshot: {settings:?}");
        Ok(settings)
    }

    async fn read_channel(
        adapter: &mut dyn ScpiAdapter,
        channel: ChannelId,
    ) -> Result<ChannelSettings> {
        let prefix = channel.scpi();
        let query = |suffix: &str| format!(":{prefix}:{suffix}");

        let settings = ChannelSettings {
            bandwidth_limit: scpi::parse_bool(
                &Self::raw_query(adapter, &query("BWLimit")).await?,
            )?,
            coupling: Self::raw_query(adapter, &query("COUPling")).await?.trim().to_string(),
            display: scpi::parse_bool(&Self::raw_query(adapter, &query("DISPlay")).await?)?,
            impedance: Self::raw_query(adapter, &query("IMPedance")).await?.trim().to_string(),
            invert: scpi::parse_bool(&Self::raw_query(adapter, &query("INVert")).await?)?,
            label: Self::raw_query(adapter, &query("LABel"))
                .await?
                .trim()
                .trim_matches('"')
                .to_string(),
            offset: scpi::parse_f64(&Self::raw_query(adapter, &query("OFFSet")).await?)?,
            probe: scpi::parse_f64(&Self::raw_query(adapter, &query("PROBe")).await?)?,
            protection: Self::raw_query(adapter, &query("PROTection")).await?.trim().to_string(),
            range: scpi::parse_f64(&Self::raw_query(adapter, &query("RANGe")).await?)?,
            scale: scpi::parse_f64(&Self::raw_query(adapter, &query("SCALe")).await?)?,
            units: Self::raw_query(adapter, &query("UNITs")).await?.trim().to_string(),
            vernier: scpi::parse_bool(&Self::raw_query(adapter, &query("VERNier")).await?)?,
        };
        debug!("{channel} snapshot: {settings:?}");
        Ok(settings)
    }

    async fn read_timebase(adapter: &mut dyn ScpiAdapter) -> Result<TimebaseSettings> {
        let settings = TimebaseSettings {
            mode: Self::raw_query(adapter, ":TIMebase:MODE").await?.trim().to_string(),
            position: scpi::parse_f64(&Self::raw_query(adapter, ":TIMebase:POSition").await?)?,
            range: scpi::parse_f64(&Self::raw_query(adapter, ":TIMebase:RANGe").await?)?,
            ref_clock: scpi::parse_bool(&Self::raw_query(adapter, ":TIMebase:REFClock").await?)?,
            reference: Self::raw_query(adapter, ":TIMebase:REFerence").await?.trim().to_string(),
            reference_location: scpi::parse_f64(
                &Self::raw_query(adapter, ":TIMebase:REFerence:LOCation").await?,
            )?,
            scale: scpi::parse_f64(&Self::raw_query(adapter, ":TIMebase:SCALe").await?)?,
            vernier: scpi::parse_bool(&Self::raw_query(adapter, ":TIMebase:VERNier").await?)?,
            window_position: scpi::parse_f64(
                &Self::raw_query(adapter, ":TIMebase:WINDow:POSition").await?,
            )?,
            window_range: scpi::parse_f64(
                &Self::raw_query(adapter, ":TIMebase:WINDow:RANGe").await?,
            )?,
            window_scale: scpi::parse_f64(
                &Self::raw_query(adapter, ":TIMebase:WINDow:SCALe").await?,
            )?,
        };
        debug!("Timebase snapshot: {settings:?}");
        Ok(settings)
    }
}

/// Relative comparison for values read back from the instrument, which
/// round-trips through NR3 text.
fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_eq() {
        assert!(approx_eq(0.2, 0.2));
        assert!(approx_eq(0.0, 0.0));
        assert!(approx_eq(1.0e9, 1.0e9 + 0.1));
        assert!(!approx_eq(0.2, 0.5));
        assert!(!approx_eq(-1.0, 1.0));
    }
}
