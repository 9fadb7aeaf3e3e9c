//! Protokollversion und Kompatibilitaetsregel

use semver::Version;

/// Version die dieser Build spricht
pub const PROTOKOLL_VERSION: &str = "0.3.0";

/// Geparste Protokollversion dieses Builds
pub fn protokoll_version() -> Version {
    // Konstante ist gueltig, siehe Test `eigene_version_parsebar`
    Version::parse(PROTOKOLL_VERSION).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// Server und Client sind kompatibel bei gleicher Major-Version und
/// Server-Minor >= Client-Minor
pub fn kompatibel(server: &Version, client: &Version) -> bool {
    server.major == client.major && server.minor >= client.minor
}
