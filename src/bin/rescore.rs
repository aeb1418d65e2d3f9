use std::env;

use anyhow::{anyhow, Result};

const USAGE: &str = "usage: rescore <exam_id> [--apply]";

#[tokio::main]
async fn main() -> Result<()> {
    let (exam_id, apply) = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = cbt_engine::run_rescore(&exam_id, apply).await {
        eprintln!("rescore fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn parse_args() -> Result<(String, bool)> {
    let mut exam_id = None;
    let mut apply = false;

    for arg in env::args().skip(1) {
        if arg == "--apply" {
            apply = true;
        } else if arg.starts_with("--") {
            return Err(anyhow!("Unknown argument: {arg}"));
        } else if exam_id.is_some() {
            return Err(anyhow!("Unexpected argument: {arg}"));
        } else {
            exam_id = Some(arg);
        }
    }

    let exam_id = exam_id.ok_or_else(|| anyhow!("exam_id missing"))?;
    Ok((exam_id, apply))
}
