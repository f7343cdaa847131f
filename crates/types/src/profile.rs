//! Transcoding profile registry and on-chain option fingerprints.

use sp_core::hashing::keccak_256;

use crate::error::{TypesError, TypesResult};

/// Bytes of keccak-256 kept per profile name in a fingerprint.
pub const PROFILE_TAG_LEN: usize = 4;

/// A named transcoding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoProfile {
    /// Registry name, e.g. `P240p30fps16x9`.
    pub name: &'static str,
    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,
    /// Frames per second.
    pub framerate: u32,
    /// Aspect ratio label.
    pub aspect_ratio: &'static str,
    /// `WIDTHxHEIGHT`.
    pub resolution: &'static str,
}

/// Parameters a manifest needs to describe a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantParams {
    /// Bits per second.
    pub bandwidth: u64,
    /// `WIDTHxHEIGHT`.
    pub resolution: String,
}

const fn profile(
    name: &'static str,
    bitrate_kbps: u32,
    framerate: u32,
    aspect_ratio: &'static str,
    resolution: &'static str,
) -> VideoProfile {
    VideoProfile {
        name,
        bitrate_kbps,
        framerate,
        aspect_ratio,
        resolution,
    }
}

/// Every profile a node knows how to request.
pub static VIDEO_PROFILES: [VideoProfile; 9] = [
    profile("P720p60fps16x9", 6000, 60, "16:9", "1280x720"),
    profile("P720p30fps16x9", 4000, 30, "16:9", "1280x720"),
    profile("P720p30fps4x3", 4000, 30, "4:3", "960x720"),
    profile("P576p30fps16x9", 1500, 30, "16:9", "1024x576"),
    profile("P360p30fps16x9", 1200, 30, "16:9", "640x360"),
    profile("P360p30fps4x3", 1000, 30, "4:3", "480x360"),
    profile("P240p30fps16x9", 600, 30, "16:9", "426x240"),
    profile("P240p30fps4x3", 600, 30, "4:3", "320x240"),
    profile("P144p30fps16x9", 400, 30, "16:9", "256x144"),
];

impl VideoProfile {
    /// Look up a profile by registry name.
    pub fn lookup(name: &str) -> Option<VideoProfile> {
        VIDEO_PROFILES.iter().find(|p| p.name == name).copied()
    }

    /// Look up a profile, failing on unknown names.
    pub fn from_name(name: &str) -> TypesResult<VideoProfile> {
        Self::lookup(name).ok_or_else(|| TypesError::UnknownProfile(name.to_string()))
    }

    /// Manifest parameters for a variant rendered with this profile.
    pub fn variant_params(&self) -> VariantParams {
        VariantParams {
            bandwidth: u64::from(self.bitrate_kbps) * 1000,
            resolution: self.resolution.to_string(),
        }
    }

    fn tag(&self) -> [u8; PROFILE_TAG_LEN] {
        let hash = keccak_256(self.name.as_bytes());
        let mut tag = [0u8; PROFILE_TAG_LEN];
        tag.copy_from_slice(&hash[..PROFILE_TAG_LEN]);
        tag
    }
}

/// Order-independent encoding of a profile set for on-chain storage.
///
/// Profiles are sorted by name and the first four bytes of each name's
/// keccak-256 digest are concatenated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionFingerprint(Vec<u8>);

impl OptionFingerprint {
    /// Fingerprint a profile set.
    pub fn from_profiles(profiles: &[VideoProfile]) -> Self {
        let mut sorted = profiles.to_vec();
        sorted.sort_by(|a, b| a.name.cmp(b.name));

        let mut bytes = Vec::with_capacity(sorted.len() * PROFILE_TAG_LEN);
        for profile in &sorted {
            bytes.extend_from_slice(&profile.tag());
        }
        Self(bytes)
    }

    /// Parse the hex form stored on chain (with or without `0x`).
    pub fn from_hex(value: &str) -> TypesResult<Self> {
        let bytes = hex::decode(value.trim_start_matches("0x"))
            .map_err(|e| TypesError::InvalidTranscodingOptions(e.to_string()))?;
        if bytes.len() % PROFILE_TAG_LEN != 0 {
            return Err(TypesError::InvalidTranscodingOptions(format!(
                "fingerprint length {} is not a multiple of {}",
                bytes.len(),
                PROFILE_TAG_LEN
            )));
        }
        Ok(Self(bytes))
    }

    /// Lowercase hex without `0x`, as submitted on chain.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Resolve the fingerprint back to registry profiles.
    ///
    /// Tags that match no known profile are an error.
    pub fn profiles(&self) -> TypesResult<Vec<VideoProfile>> {
        self.0
            .chunks(PROFILE_TAG_LEN)
            .map(|tag| {
                VIDEO_PROFILES
                    .iter()
                    .find(|p| p.tag() == tag)
                    .copied()
                    .ok_or_else(|| TypesError::UnknownProfile(hex::encode(tag)))
            })
            .collect()
    }
}

/// Job creation parameters a broadcaster attaches to every new stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Price ceiling per segment, in token base units.
    pub max_price_per_segment: u128,
    /// Requested renditions.
    pub profiles: Vec<VideoProfile>,
}

impl BroadcastConfig {
    /// Build from a comma separated profile list.
    ///
    /// Unknown names are skipped. An empty result is an error.
    pub fn from_options(max_price_per_segment: u128, options: &str) -> TypesResult<Self> {
        let mut profiles = Vec::new();
        for name in options.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match VideoProfile::lookup(name) {
                Some(p) if !profiles.contains(&p) => profiles.push(p),
                Some(_) => {}
                None => tracing::warn!(profile = %name, "Skipping unknown transcoding profile"),
            }
        }

        if profiles.is_empty() {
            return Err(TypesError::InvalidTranscodingOptions(options.to_string()));
        }

        Ok(Self {
            max_price_per_segment,
            profiles,
        })
    }

    /// Fingerprint of the requested profiles.
    pub fn fingerprint(&self) -> OptionFingerprint {
        OptionFingerprint::from_profiles(&self.profiles)
    }

    /// Comma separated profile names.
    pub fn options(&self) -> String {
        self.profiles
            .iter()
            .map(|p| p.name)
            .collect::<Vec<_>>()
            .join(",")
    }
}
