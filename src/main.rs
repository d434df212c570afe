use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "usage: invoicer --source <export.xlsx> --template <template.xlsx> --output <invoice.xlsx>";

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let mut source: Option<PathBuf> = None;
    let mut template: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--source" => {
                source = Some(PathBuf::from(
                    args.next().context("--source requires a path")?,
                ))
            }
            "--template" => {
                template = Some(PathBuf::from(
                    args.next().context("--template requires a path")?,
                ))
            }
            "--output" => {
                output = Some(PathBuf::from(
                    args.next().context("--output requires a path")?,
                ))
            }
            other => bail!("unknown argument `{other}`\n{USAGE}"),
        }
    }

    let source = source.with_context(|| USAGE.to_string())?;
    let template = template.with_context(|| USAGE.to_string())?;
    let output = output.with_context(|| USAGE.to_string())?;

    let written = invoicer::convert(&source, &template, &output)
        .with_context(|| format!("failed to convert {}", source.display()))?;
    info!(path = %written.display(), "done");
    Ok(())
}
