// taskleak: inspect thread tables and diff saved task dumps
//
// Commands:
//   taskleak dump [--pid <pid>]
//   taskleak diff <baseline> <current> [--filter <s>]... [--ignore <s>]... [--json]

use anyhow::{anyhow, Context, Result};
use std::{env, fs, process};
use taskleak::{capture, settle::leak_candidates, LeakReport};

fn print_help() {
    println!(
        r#"taskleak - inspect running tasks and find leaks between two dumps

USAGE:
    taskleak <COMMAND> [OPTIONS]

COMMANDS:
    dump                       Print the thread table of a process
    diff <baseline> <current>  Report tasks in <current> not accounted for in <baseline>
    help                       Show this help message

OPTIONS:
    --pid <pid>        Process to dump (defaults to this process)
    --filter <s>       Only report tasks whose label or stack contains <s>
    --ignore <s>       Never report tasks whose label or stack contains <s>
    --json             Output the diff report as JSON

EXIT STATUS:
    diff exits with 1 when leaked tasks are found

EXAMPLES:
    taskleak dump --pid 4242 > before.txt
    taskleak dump --pid 4242 > after.txt
    taskleak diff before.txt after.txt --filter worker
"#
    );
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let command = &args[1];

    let mut pid: Option<u32> = None;
    let mut filters: Vec<String> = Vec::new();
    let mut ignore: Vec<String> = Vec::new();
    let mut json_output = false;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--pid" | "-p" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--pid requires a value"))?;
                pid = Some(
                    value
                        .parse::<u32>()
                        .with_context(|| format!("invalid pid '{}'", value))?,
                );
            }
            "--filter" | "-f" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--filter requires a value"))?;
                filters.push(value.clone());
            }
            "--ignore" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--ignore requires a value"))?;
                ignore.push(value.clone());
            }
            "--json" => {
                json_output = true;
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    match command.as_str() {
        "dump" => cmd_dump(pid),
        "diff" => {
            let [baseline, current] = positional.as_slice() else {
                return Err(anyhow!("diff takes exactly two files: <baseline> <current>"));
            };
            let leaked = cmd_diff(baseline, current, &filters, &ignore, json_output)?;
            if leaked {
                process::exit(1);
            }
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            process::exit(2);
        }
    }
}

#[cfg(target_os = "linux")]
fn cmd_dump(pid: Option<u32>) -> Result<()> {
    use taskleak::{DumpSource, ProcThreadSource};

    let source = match pid {
        Some(pid) => ProcThreadSource::for_pid(pid)?,
        None => ProcThreadSource::current_process()?,
    };
    let text = source.dump().context("failed to read thread table")?;
    print!("{}", text);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn cmd_dump(_pid: Option<u32>) -> Result<()> {
    Err(anyhow!("dump is only supported on Linux"))
}

/// Returns whether leaks were found
fn cmd_diff(
    baseline_path: &str,
    current_path: &str,
    filters: &[String],
    ignore: &[String],
    json_output: bool,
) -> Result<bool> {
    let baseline_text = fs::read_to_string(baseline_path)
        .with_context(|| format!("failed to read baseline dump {}", baseline_path))?;
    let current_text = fs::read_to_string(current_path)
        .with_context(|| format!("failed to read current dump {}", current_path))?;

    let baseline = capture::parse_snapshot(&baseline_text);
    let current = capture::parse_snapshot(&current_text);
    let filters: Vec<&str> = filters.iter().map(String::as_str).collect();

    let leaks = leak_candidates(&baseline, &current, &filters, ignore);
    let report = LeakReport {
        leaks,
        attempts: 1,
        settled_ms: 0,
    };

    if json_output {
        println!("{}", report.to_json()?);
    } else if report.leaks.is_empty() {
        println!(
            "No leaked tasks ({} in baseline, {} in current)",
            baseline.len(),
            current.len()
        );
    } else {
        println!("{}", report);
    }

    Ok(!report.leaks.is_empty())
}
