//! Command line options.

use crate::consts::DEFAULT_HOST;
use crate::consts::DEFAULT_PORT;
use crate::prelude::*;
use clap::Parser;

const ABOUT: &str =
  "Debug Nashorn scripts in a remote JVM with Chrome DevTools.";

#[derive(Parser, Debug, Clone)]
#[command(name = "nashdbg", version, about = ABOUT, long_about = ABOUT)]
/// Command line options.
pub struct CliOptions {
  #[arg(
    long = "connect",
    value_name = "HOST:PORT",
    help = "JDWP address of the debug target"
  )]
  connect: Option<String>,
}

impl CliOptions {
  /// The debug target address, defaulting to `localhost:7777`.
  pub fn target(&self) -> AnyResult<(String, u16)> {
    let Some(connect) = &self.connect else {
      return Ok((DEFAULT_HOST.to_string(), DEFAULT_PORT));
    };
    match connect.rsplit_once(':') {
      Some((host, port)) if !host.is_empty() => {
        let port = port
          .parse::<u16>()
          .map_err(|_| anyhow::anyhow!("invalid port in {connect:?}"))?;
        Ok((host.to_string(), port))
      }
      _ => anyhow::bail!("expected HOST:PORT, got {connect:?}"),
    }
  }

  #[cfg(test)]
  pub fn with_connect(connect: &str) -> Self {
    Self {
      connect: Some(connect.to_string()),
    }
  }
}
