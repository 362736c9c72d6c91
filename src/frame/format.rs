//! Frame Format Descriptor.
//!
//! A [`FrameFormat`] is pure data: the sync marker, the fixed payload length and the
//! ordered field rules that turn a payload into channel values. It is validated once,
//! when it is built, so the decoder never has to re-check the layout per frame.
//!
//! # Example
//!
//! ```
//! use frame_daq::frame::{FrameFormat, SyncPolicy};
//!
//! let format = FrameFormat::builder([0xAE, 0xBC], 4)
//!     .name("dual nibble")
//!     .nibble(0)
//!     .nibble(2)
//!     .policy(SyncPolicy::Strict)
//!     .build()?;
//! assert_eq!(format.channel_count(), 2);
//! # Ok::<(), frame_daq::error::DaqError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};
use crate::frame::fields::FieldRule;

/// How the synchronizer treats a byte that breaks a partial marker match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// A breaking byte equal to the first marker byte starts a fresh match.
    #[default]
    Restart,
    /// Any breaking byte drops the partial match entirely.
    Strict,
}

/// Validated frame layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFormat {
    name: String,
    sync_bytes: Vec<u8>,
    payload_length: usize,
    field_rules: Vec<FieldRule>,
    policy: SyncPolicy,
    resync_in_payload: bool,
    sync_border: usize,
}

impl FrameFormat {
    /// Start building a descriptor for the given marker and payload length.
    pub fn builder(sync_bytes: impl Into<Vec<u8>>, payload_length: usize) -> FrameFormatBuilder {
        FrameFormatBuilder {
            name: None,
            sync_bytes: sync_bytes.into(),
            payload_length,
            field_rules: Vec::new(),
            policy: SyncPolicy::default(),
            resync_in_payload: true,
        }
    }

    /// `FF FF` marker, ADC word and filter word, both masked to 12 bits.
    pub fn ff_ff_masked() -> Self {
        Self::assemble(
            "ff_ff_masked",
            vec![0xFF, 0xFF],
            4,
            vec![FieldRule::masked_bits(0, 12), FieldRule::masked_bits(2, 12)],
        )
    }

    /// `AE AE` marker with two 12-bit masked words.
    pub fn ae_ae_masked() -> Self {
        Self::assemble(
            "ae_ae_masked",
            vec![0xAE, 0xAE],
            4,
            vec![FieldRule::masked_bits(0, 12), FieldRule::masked_bits(2, 12)],
        )
    }

    /// `AE BC` marker with two nibble-packed 12-bit channels.
    pub fn ae_bc_nibble() -> Self {
        Self::assemble(
            "ae_bc_nibble",
            vec![0xAE, 0xBC],
            4,
            vec![FieldRule::Nibble { offset: 0 }, FieldRule::Nibble { offset: 2 }],
        )
    }

    /// Names accepted by [`FrameFormat::preset`].
    pub const PRESETS: [&'static str; 3] = ["ff_ff_masked", "ae_ae_masked", "ae_bc_nibble"];

    /// Look up a built-in format by name.
    pub fn preset(name: &str) -> AppResult<Self> {
        match name {
            "ff_ff_masked" => Ok(Self::ff_ff_masked()),
            "ae_ae_masked" => Ok(Self::ae_ae_masked()),
            "ae_bc_nibble" => Ok(Self::ae_bc_nibble()),
            other => Err(DaqError::InvalidFormat(format!(
                "unknown preset '{}'. Must be one of: {}",
                other,
                Self::PRESETS.join(", ")
            ))),
        }
    }

    // Presets are covered by `presets_pass_validation`.
    fn assemble(name: &str, sync_bytes: Vec<u8>, payload_length: usize, field_rules: Vec<FieldRule>) -> Self {
        let sync_border = longest_border(&sync_bytes);
        Self {
            name: name.to_string(),
            sync_bytes,
            payload_length,
            field_rules,
            policy: SyncPolicy::default(),
            resync_in_payload: true,
            sync_border,
        }
    }

    /// Descriptor name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marker that precedes every payload.
    pub fn sync_bytes(&self) -> &[u8] {
        &self.sync_bytes
    }

    /// Fixed payload size in bytes.
    pub fn payload_length(&self) -> usize {
        self.payload_length
    }

    /// Bytes on the wire per frame, marker included.
    pub fn frame_length(&self) -> usize {
        self.sync_bytes.len() + self.payload_length
    }

    /// Extraction rules, one per channel.
    pub fn field_rules(&self) -> &[FieldRule] {
        &self.field_rules
    }

    /// Channels per Sample Record.
    pub fn channel_count(&self) -> usize {
        self.field_rules.len()
    }

    /// Partial-match policy of the synchronizer.
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Whether a marker seen mid-payload restarts assembly.
    pub fn resync_in_payload(&self) -> bool {
        self.resync_in_payload
    }

    /// Longest proper prefix of the marker that is also a suffix.
    ///
    /// After a completed marker the synchronizer is re-armed with this many bytes so
    /// overlapping markers (`FF FF FF`) align on the last occurrence.
    pub fn sync_border(&self) -> usize {
        self.sync_border
    }

    /// Copy with a different synchronizer policy.
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Copy with mid-payload resynchronization switched on or off.
    pub fn with_resync_in_payload(mut self, enabled: bool) -> Self {
        self.resync_in_payload = enabled;
        self
    }

    /// Apply every field rule to a complete payload.
    pub fn decode_fields(&self, payload: &[u8]) -> Option<Vec<u16>> {
        if payload.len() != self.payload_length {
            return None;
        }
        self.field_rules.iter().map(|rule| rule.extract(payload)).collect()
    }

    fn validate(&self) -> AppResult<()> {
        if self.sync_bytes.is_empty() {
            return Err(invalid("sync marker must contain at least one byte"));
        }
        if self.payload_length == 0 {
            return Err(invalid("payload_length must be at least 1"));
        }
        if self.field_rules.is_empty() {
            return Err(invalid("at least one field rule is required"));
        }

        let mut covered = vec![false; self.payload_length];
        for (index, rule) in self.field_rules.iter().enumerate() {
            if let FieldRule::Masked { mask: 0, .. } = rule {
                return Err(invalid(format!("field {index} has an empty mask")));
            }
            let end = rule.offset() + rule.width();
            if end > self.payload_length {
                return Err(invalid(format!(
                    "field {index} reads bytes {}..{end} past payload_length {}",
                    rule.offset(),
                    self.payload_length
                )));
            }
            for slot in &mut covered[rule.offset()..end] {
                if *slot {
                    return Err(invalid(format!(
                        "field {index} overlaps an earlier field at offset {}",
                        rule.offset()
                    )));
                }
                *slot = true;
            }
        }

        let consumed: usize = self.field_rules.iter().map(FieldRule::width).sum();
        if consumed != self.payload_length {
            return Err(invalid(format!(
                "field rules consume {consumed} bytes but payload_length is {}",
                self.payload_length
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> DaqError {
    DaqError::InvalidFormat(message.into())
}

/// KMP failure value of the whole marker.
fn longest_border(marker: &[u8]) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| marker[..len] == marker[marker.len() - len..])
        .unwrap_or(0)
}

/// Builder for [`FrameFormat`].
#[derive(Debug, Clone)]
pub struct FrameFormatBuilder {
    name: Option<String>,
    sync_bytes: Vec<u8>,
    payload_length: usize,
    field_rules: Vec<FieldRule>,
    policy: SyncPolicy,
    resync_in_payload: bool,
}

impl FrameFormatBuilder {
    /// Set the descriptor name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a masked 16-bit rule.
    pub fn masked(mut self, offset: usize, mask: u16) -> Self {
        self.field_rules.push(FieldRule::Masked { offset, mask });
        self
    }

    /// Append a nibble-repack rule.
    pub fn nibble(mut self, offset: usize) -> Self {
        self.field_rules.push(FieldRule::Nibble { offset });
        self
    }

    /// Append an arbitrary rule.
    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.field_rules.push(rule);
        self
    }

    /// Set the synchronizer policy.
    ///
    /// Default: [`SyncPolicy::Restart`]
    pub fn policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable or disable mid-payload resynchronization.
    ///
    /// Default: enabled
    pub fn resync_in_payload(mut self, enabled: bool) -> Self {
        self.resync_in_payload = enabled;
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> AppResult<FrameFormat> {
        let name = self.name.unwrap_or_else(|| {
            let marker: Vec<String> = self.sync_bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("custom_{}", marker.join("_"))
        });
        let format = FrameFormat {
            name,
            sync_border: longest_border(&self.sync_bytes),
            sync_bytes: self.sync_bytes,
            payload_length: self.payload_length,
            field_rules: self.field_rules,
            policy: self.policy,
            resync_in_payload: self.resync_in_payload,
        };
        format.validate()?;
        Ok(format)
    }
}

/// One field rule as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRuleConfig {
    /// Big-endian word masked to `mask_bits` low bits.
    Masked {
        /// Payload byte offset
        offset: usize,
        /// Bits kept after masking (1-16)
        #[serde(default = "default_mask_bits")]
        mask_bits: u8,
    },
    /// Nibble-packed 12-bit value.
    Nibble {
        /// Payload byte offset
        offset: usize,
    },
}

fn default_mask_bits() -> u8 {
    12
}

impl FieldRuleConfig {
    fn to_rule(&self) -> AppResult<FieldRule> {
        match *self {
            FieldRuleConfig::Masked { offset, mask_bits } => {
                if !(1..=16).contains(&mask_bits) {
                    return Err(invalid(format!(
                        "mask_bits {mask_bits} at offset {offset} must be 1-16"
                    )));
                }
                Ok(FieldRule::masked_bits(offset, mask_bits))
            }
            FieldRuleConfig::Nibble { offset } => Ok(FieldRule::Nibble { offset }),
        }
    }
}

/// Frame format section of the configuration.
///
/// Either names a preset or spells out a custom descriptor:
///
/// ```toml
/// [format]
/// sync_bytes = [0xAE, 0xBC]
/// payload_length = 4
/// sync_policy = "strict"
/// fields = [{ kind = "nibble", offset = 0 }, { kind = "nibble", offset = 2 }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormatConfig {
    /// Built-in format name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Custom descriptor name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Custom sync marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_bytes: Option<Vec<u8>>,
    /// Custom payload length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_length: Option<usize>,
    /// Custom field rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRuleConfig>,
    /// Synchronizer policy, applied to presets too
    #[serde(default)]
    pub sync_policy: SyncPolicy,
    /// Mid-payload resynchronization, applied to presets too
    #[serde(default = "default_resync")]
    pub resync_in_payload: bool,
}

fn default_resync() -> bool {
    true
}

impl Default for FrameFormatConfig {
    fn default() -> Self {
        Self {
            preset: Some("ff_ff_masked".to_string()),
            name: None,
            sync_bytes: None,
            payload_length: None,
            fields: Vec::new(),
            sync_policy: SyncPolicy::default(),
            resync_in_payload: true,
        }
    }
}

impl FrameFormatConfig {
    /// Config section naming a preset.
    pub fn preset(name: &str) -> Self {
        Self {
            preset: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// Resolve into a validated descriptor.
    pub fn build(&self) -> AppResult<FrameFormat> {
        let custom = self.sync_bytes.is_some() || self.payload_length.is_some() || !self.fields.is_empty();
        let format = match (&self.preset, custom) {
            (Some(_), true) => {
                return Err(invalid(
                    "format sets both 'preset' and custom sync_bytes/payload_length/fields",
                ))
            }
            (Some(preset), false) => FrameFormat::preset(preset)?,
            (None, true) => {
                let sync_bytes = self
                    .sync_bytes
                    .clone()
                    .ok_or_else(|| invalid("custom format requires 'sync_bytes'"))?;
                let payload_length = self
                    .payload_length
                    .ok_or_else(|| invalid("custom format requires 'payload_length'"))?;
                let mut builder = FrameFormat::builder(sync_bytes, payload_length);
                if let Some(name) = &self.name {
                    builder = builder.name(name.clone());
                }
                for field in &self.fields {
                    builder = builder.rule(field.to_rule()?);
                }
                builder.build()?
            }
            (None, false) => return Err(invalid("format needs a 'preset' or a custom descriptor")),
        };
        Ok(format
            .with_policy(self.sync_policy)
            .with_resync_in_payload(self.resync_in_payload))
    }
}
