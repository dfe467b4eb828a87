//! Hosting deployment values.

use std::fmt;

/// Where a product install is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// Self-hosted server.
    Server,
    /// Vendor cloud.
    Cloud,
    /// Self-hosted data center.
    DataCenter,
    /// A contact with installs across several deployments.
    Multiple,
}

impl Deployment {
    /// Parses the remote value; unknown values read as absent.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Server" => Some(Self::Server),
            "Cloud" => Some(Self::Cloud),
            "Data Center" => Some(Self::DataCenter),
            "Multiple" => Some(Self::Multiple),
            _ => None,
        }
    }

    /// Returns the remote value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "Server",
            Self::Cloud => "Cloud",
            Self::DataCenter => "Data Center",
            Self::Multiple => "Multiple",
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        for value in ["Server", "Cloud", "Data Center", "Multiple"] {
            assert_eq!(Deployment::parse(value).unwrap().as_str(), value);
        }
    }

    #[test]
    fn unknown_value_is_absent() {
        assert_eq!(Deployment::parse("Mainframe"), None);
        assert_eq!(Deployment::parse(""), None);
    }
}
