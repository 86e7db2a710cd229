//! Isolated render context. Reads newline-delimited JSON envelopes on stdin
//! and answers on stdout; diagnostics go to stderr.

use canvasforge_core::logging;
use canvasforge_core::sandbox::runtime::{self, SandboxLimits};
use canvasforge_core::sandbox::{Envelope, ErrorDetail, SandboxMessage};
use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::time::Duration;

fn main() {
    logging::init("warn");

    let limits = match parse_args(env::args().skip(1)) {
        Ok(limits) => limits,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!();
            eprintln!("Usage: canvasforge-sandbox [--memory-limit BYTES] [--script-timeout-ms MS]");
            process::exit(2);
        }
    };

    if let Err(e) = serve(io::stdin().lock(), io::stdout().lock(), &limits) {
        tracing::error!(error = %e, "sandbox stream failed");
        process::exit(1);
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<SandboxLimits, String> {
    let mut limits = SandboxLimits::default();
    let mut args = args;
    while let Some(flag) = args.next() {
        let value = args
            .next()
            .ok_or_else(|| format!("Missing value for {}", flag))?;
        match flag.as_str() {
            "--memory-limit" => {
                limits.memory_limit_bytes = value
                    .parse()
                    .map_err(|_| format!("Invalid --memory-limit '{}'", value))?;
            }
            "--script-timeout-ms" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| format!("Invalid --script-timeout-ms '{}'", value))?;
                limits.script_timeout = Duration::from_millis(ms);
            }
            other => return Err(format!("Unknown option '{}'", other)),
        }
    }
    Ok(limits)
}

fn serve(input: impl BufRead, mut output: impl Write, limits: &SandboxLimits) -> io::Result<()> {
    send(&mut output, &Envelope::new(SandboxMessage::Ready))?;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match Envelope::decode(&line) {
            Ok(envelope) => runtime::respond(&envelope, limits),
            Err(e) => {
                tracing::warn!(error = %e, "undecodable request");
                Some(Envelope::new(SandboxMessage::Error(ErrorDetail::new(e.to_string()))))
            }
        };
        if let Some(reply) = reply {
            send(&mut output, &reply)?;
        }
    }
    Ok(())
}

fn send(output: &mut impl Write, envelope: &Envelope) -> io::Result<()> {
    let line = envelope
        .encode()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    writeln!(output, "{}", line)?;
    output.flush()
}
