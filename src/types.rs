use serde::Deserialize;

/// Identifier of a monitored worker process (its pid).
pub type JobId = u32;

/// How the output router relocates a finished artifact.
///
/// - `Rsync`: `rsync --remove-source-files <src> <dst>` (default).
/// - `Copy`: rename, falling back to copy + remove when the destination is on
///   another device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocateMethod {
    #[default]
    Rsync,
    Copy,
}
