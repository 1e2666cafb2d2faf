//! Build configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{min_chip_size, Process, ANGLE_RESOLUTION, CAVITY_WIDTH, CHIP_SIZE};
use crate::error::{MaskError, Result};
use crate::handle::HandlePolicy;
use crate::layers::MegaPcLayers;
use crate::offset::OffsetStyle;

/// Options of a single mask build.
///
/// Every field has a default, so a configuration file only lists what it changes:
///
/// ```
/// # use masks::config::BuildConfig;
/// # use masks::handle::HandlePolicy;
/// let config = BuildConfig::from_toml_str(r#"
///     version = "2.1"
///     handle_policy = "difference"
/// "#).unwrap();
/// assert_eq!(config.version, "2.1");
/// assert_eq!(config.handle_policy, HandlePolicy::Difference);
/// assert!(!config.mirror);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Version label, also part of every output file name.
    pub version: String,
    /// Source revision label.
    pub hash: String,
    /// Directory receiving the output files.
    pub out_dir: PathBuf,
    /// Side of the square chip, in microns.
    pub chip_size: f64,
    /// Width of the handle cavity around each depth partition.
    pub cavity_width: f64,
    /// Skips merging DEVICE into DEVICE_REMOVE.
    pub no_merge: bool,
    /// Also writes reticles mirrored across `x = 0`.
    pub mirror: bool,
    pub handle_policy: HandlePolicy,
    /// Vertices of the disk used to grow handle partitions.
    pub offset_segments: usize,
    /// Angle resolution of curved device edges, in degrees.
    pub angle_resolution: f64,
    /// Draws release holes on DEVICE_REMOVE.
    pub release_holes: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            hash: String::new(),
            out_dir: PathBuf::from("build"),
            chip_size: CHIP_SIZE,
            cavity_width: CAVITY_WIDTH,
            no_merge: false,
            mirror: false,
            handle_policy: HandlePolicy::default(),
            offset_segments: 64,
            angle_resolution: ANGLE_RESOLUTION,
            release_holes: true,
        }
    }
}

impl BuildConfig {
    /// Parses a configuration from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reads a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading build configuration");
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Checks that the configuration can produce a build.
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(MaskError::Config("a version is required".into()));
        }
        if self
            .version
            .chars()
            .any(|c| c.is_whitespace() || std::path::is_separator(c))
        {
            return Err(MaskError::Config(format!(
                "version `{}` cannot be used in a file name",
                self.version
            )));
        }
        if !(self.chip_size.is_finite() && self.chip_size > 0.) {
            return Err(MaskError::Config(format!(
                "chip size must be positive, got {}",
                self.chip_size
            )));
        }
        if !(self.cavity_width.is_finite() && self.cavity_width >= 0.) {
            return Err(MaskError::Config(format!(
                "cavity width must be non-negative, got {}",
                self.cavity_width
            )));
        }
        let min = min_chip_size(self.cavity_width);
        if self.chip_size < min {
            return Err(MaskError::Config(format!(
                "chip size {} leaves no room for the device, need at least {min}",
                self.chip_size
            )));
        }
        Ok(())
    }

    /// The prefix of every output file.
    pub fn prefix(&self) -> String {
        format!("mega_pc_{}", self.version)
    }

    /// The path of the output file with the given suffix.
    pub fn output(&self, suffix: &str) -> PathBuf {
        self.out_dir.join(format!("{}_{suffix}", self.prefix()))
    }

    /// The identifier written on every reticle.
    pub fn reticle_id(&self) -> String {
        format!("MPC-{}", self.version)
    }

    pub fn offset_style(&self) -> OffsetStyle {
        OffsetStyle::Round {
            segments: self.offset_segments,
        }
    }

    /// The drawing process for `layers`.
    pub fn process(&self, layers: &MegaPcLayers) -> Process {
        let mut process = Process::mega_pc(layers);
        process.chip_size = self.chip_size;
        process.cavity_width = self.cavity_width;
        process.angle_resolution = self.angle_resolution;
        if !self.release_holes {
            process.release = None;
        }
        process
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerRegistry;

    #[test]
    fn defaults_match_the_production_build() {
        let config = BuildConfig::default();
        assert_eq!(config.chip_size, 8000.);
        assert_eq!(config.cavity_width, 40.);
        assert_eq!(config.handle_policy, HandlePolicy::Union);
        assert_eq!(config.out_dir, PathBuf::from("build"));

        let layers = MegaPcLayers::new(&LayerRegistry::mega_pc().unwrap()).unwrap();
        let process = config.process(&layers);
        assert_eq!(process.angle_resolution, 0.1);
        assert_eq!(process.chip_size, config.chip_size);
        assert_eq!(process.cavity_width, config.cavity_width);
        assert_eq!(process.release.map(|r| r.layer), Some(layers.device_remove));
    }

    #[test]
    fn output_paths_carry_the_version() {
        let config = BuildConfig {
            version: "3b".into(),
            out_dir: PathBuf::from("out"),
            ..Default::default()
        };
        assert_eq!(
            config.output("BUILD.gds"),
            PathBuf::from("out/mega_pc_3b_BUILD.gds")
        );
        assert_eq!(config.reticle_id(), "MPC-3b");
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        assert!(matches!(
            BuildConfig::default().validate(),
            Err(MaskError::Config(_))
        ));
        let bad = BuildConfig {
            version: "1".into(),
            cavity_width: -1.,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = BuildConfig {
            version: "1".into(),
            chip_size: 5000.,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = BuildConfig {
            version: "a/b".into(),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        assert!(matches!(
            BuildConfig::from_toml_str("unknown = 1"),
            Err(MaskError::Config(_))
        ));
        assert!(matches!(
            BuildConfig::from_toml_str("handle_policy = \"xor\""),
            Err(MaskError::Config(_))
        ));
    }

    #[test]
    fn device_dimensions_come_from_the_configuration() {
        let layers = MegaPcLayers::new(&LayerRegistry::mega_pc().unwrap()).unwrap();
        let config = BuildConfig {
            version: "1".into(),
            chip_size: 9000.,
            cavity_width: 25.,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        let process = config.process(&layers);
        assert_eq!((process.chip_size, process.cavity_width), (9000., 25.));
    }

    #[test]
    fn files_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("megapc.toml");
        std::fs::write(&path, "version = \"7\"\nno_merge = true\noffset_segments = 16\n").unwrap();
        let config = BuildConfig::from_file(&path).unwrap();
        assert!(config.no_merge);
        assert_eq!(config.offset_style(), OffsetStyle::Round { segments: 16 });
        assert!(config.validate().is_ok());

        assert!(matches!(
            BuildConfig::from_file(dir.path().join("missing.toml")),
            Err(MaskError::Io(_))
        ));
    }
}
