//! Listening endpoints written as `unix:///path` or `tcp://host:port`.

use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Where the worker accepts client connections.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket at `path`.
    Unix {
        /// Socket file path.
        path: Utf8PathBuf,
    },
    /// TCP socket; port `0` picks a free port.
    Tcp {
        /// Host name or address.
        host: String,
        /// Port number.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Creates the directory holding a unix socket, owner-only on unix.
    ///
    /// TCP endpoints need nothing and succeed immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SocketDirError`] when the socket path has no directory part
    /// or the directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketDirError> {
        match self {
            Self::Tcp { .. } => Ok(()),
            Self::Unix { path } => create_socket_dir(socket_dir(path)?),
        }
    }
}

fn socket_dir(path: &Utf8Path) -> Result<&Utf8Path, SocketDirError> {
    match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => Ok(dir),
        _ => Err(SocketDirError::NoDirectory {
            path: path.to_owned(),
        }),
    }
}

fn create_socket_dir(dir: &Utf8Path) -> Result<(), SocketDirError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    std::os::unix::fs::DirBuilderExt::mode(&mut builder, 0o700);

    match builder.create(dir) {
        Err(source) if source.kind() != io::ErrorKind::AlreadyExists => {
            Err(SocketDirError::Create {
                dir: dir.to_owned(),
                source,
            })
        }
        _ => Ok(()),
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Unix { path } => write!(f, "unix://{path}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = EndpointError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(text).map_err(|source| EndpointError::Malformed {
            text: text.to_owned(),
            source,
        })?;
        let missing = |part| EndpointError::Incomplete {
            text: text.to_owned(),
            part,
        };
        match url.scheme() {
            "tcp" => {
                let host = url.host_str().ok_or_else(|| missing("host"))?;
                let port = url.port().ok_or_else(|| missing("port"))?;
                Ok(Self::tcp(host, port))
            }
            "unix" if url.path().is_empty() => Err(missing("socket path")),
            "unix" => Ok(Self::unix(url.path())),
            scheme => Err(EndpointError::Scheme {
                scheme: scheme.to_owned(),
            }),
        }
    }
}

/// An endpoint string that could not be understood.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The text is not a URL.
    #[error("'{text}' is not an endpoint URL: {source}")]
    Malformed {
        /// Offending text.
        text: String,
        /// URL parser error.
        #[source]
        source: url::ParseError,
    },
    /// Neither `unix` nor `tcp`.
    #[error("unsupported endpoint scheme '{scheme}'")]
    Scheme {
        /// Scheme found in the URL.
        scheme: String,
    },
    /// A required part of the endpoint is absent.
    #[error("endpoint '{text}' has no {part}")]
    Incomplete {
        /// Offending text.
        text: String,
        /// Name of the absent part.
        part: &'static str,
    },
}

/// The directory for a unix socket could not be set up.
#[derive(Debug, Error)]
pub enum SocketDirError {
    /// The socket path is a bare file name.
    #[error("socket path '{path}' has no directory part")]
    NoDirectory {
        /// Configured socket path.
        path: Utf8PathBuf,
    },
    /// Creating the directory failed.
    #[error("cannot create socket directory '{dir}': {source}")]
    Create {
        /// Directory that was being created.
        dir: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("tcp://127.0.0.1:9000", SocketEndpoint::tcp("127.0.0.1", 9000))]
    #[case("unix:///run/hostwire/relay.sock", SocketEndpoint::unix("/run/hostwire/relay.sock"))]
    fn endpoints_print_as_they_parse(#[case] text: &str, #[case] expected: SocketEndpoint) {
        let parsed: SocketEndpoint = text.parse().expect("parse endpoint");
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), text);
    }

    #[rstest]
    #[case::no_port("tcp://127.0.0.1", "port")]
    #[case::no_path("unix://", "socket path")]
    fn incomplete_endpoints_name_the_gap(#[case] text: &str, #[case] gap: &str) {
        let error = text.parse::<SocketEndpoint>().expect_err("incomplete");
        assert!(
            matches!(&error, EndpointError::Incomplete { part, .. } if *part == gap),
            "{error:?}"
        );
    }

    #[rstest]
    #[case("udp://127.0.0.1:9000")]
    #[case("not a url")]
    fn foreign_text_is_rejected(#[case] text: &str) {
        assert!(text.parse::<SocketEndpoint>().is_err());
    }

    #[test]
    fn unix_socket_directory_is_created() {
        let root = tempfile::tempdir().expect("temp dir");
        let dir = Utf8PathBuf::from_path_buf(root.path().join("run").join("hostwire"))
            .expect("utf8 path");

        SocketEndpoint::unix(dir.join("relay.sock"))
            .prepare_filesystem()
            .expect("prepare socket directory");

        assert!(dir.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).expect("dir metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn bare_socket_name_is_refused() {
        let error = SocketEndpoint::unix("relay.sock")
            .prepare_filesystem()
            .expect_err("no directory part");
        assert!(matches!(error, SocketDirError::NoDirectory { .. }));
    }

    #[test]
    fn tcp_endpoints_need_no_preparation() {
        SocketEndpoint::tcp("127.0.0.1", 0)
            .prepare_filesystem()
            .expect("nothing to prepare");
    }
}
