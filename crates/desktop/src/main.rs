//! Terminal front end for the stock room.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;

use stockroom_core::{Entity, ItemId};
use stockroom_desktop::{
    DesktopConfig, LineScanner, Outcome, ScanBridge, ScanEvent, Session, SessionError,
    TextDecoder, Workbench, WorkbenchError,
};
use stockroom_infra::{CommitError, InventoryStore, SqliteStore};
use stockroom_inventory::{UsagePeriod, Validator};

type Lines = io::Lines<io::StdinLock<'static>>;

const HELP: &str = "\
commands:
  list                      show every item
  search <text>             find items by name or id
  select <id>               choose the item to work on
  qty <n>                   set the quantity for the next add/remove
  reset                     clear the quantity
  add [n] | remove [n]      change the selected item
  save                      commit pending changes
  scan | stop               start or cancel a scan
  history <daily|weekly> [month]
  changes                   this session's change feed
  quit";

fn main() -> anyhow::Result<()> {
    let config = DesktopConfig::from_env().context("invalid configuration")?;
    stockroom_observability::init_with(config.log_format);
    config
        .prepare_storage()
        .context("failed to prepare data directory")?;

    let store: Arc<dyn InventoryStore> = Arc::new(
        SqliteStore::open(&config.database_url)
            .with_context(|| format!("failed to open database {}", config.database_url))?,
    );

    let mut lines = io::stdin().lock().lines();

    let Some(session) = login(store.as_ref(), &mut lines)? else {
        return Ok(());
    };

    let mut bench = Workbench::open(
        session,
        Arc::clone(&store),
        Validator::new(config.large_change_threshold),
    )
    .context("failed to load catalog")?;

    if let Some(device) = &config.scanner_device {
        let bridge = ScanBridge::new(
            Arc::new(LineScanner::new(device)),
            Arc::new(TextDecoder),
            Arc::clone(&store),
        );
        bench = bench.with_scanner(bridge, config.scan_config());
    }

    println!("{HELP}");
    run(&mut bench, &mut lines)
}

fn prompt(text: &str) -> anyhow::Result<()> {
    print!("{text}");
    io::stdout().flush().context("failed to write to stdout")
}

fn read_line(lines: &mut Lines) -> anyhow::Result<Option<String>> {
    lines.next().transpose().context("failed to read stdin")
}

fn confirm(lines: &mut Lines, question: &str) -> bool {
    if prompt(&format!("{question} [y/N] ")).is_err() {
        return false;
    }
    matches!(
        read_line(lines).ok().flatten().as_deref().map(str::trim),
        Some("y" | "Y" | "yes" | "Yes")
    )
}

/// Ask for `login <operator> <credential>` until it succeeds. `None` on quit.
fn login(store: &dyn InventoryStore, lines: &mut Lines) -> anyhow::Result<Option<Session>> {
    loop {
        prompt("login> ")?;
        let Some(line) = read_line(lines)? else {
            return Ok(None);
        };
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("quit"), _, _) => return Ok(None),
            (Some("login"), Some(operator), Some(credential)) => {
                match Session::login(store, operator, credential) {
                    Ok(session) => {
                        println!("logged in as {}", session.operator());
                        return Ok(Some(session));
                    }
                    Err(SessionError::InvalidCredentials) => {
                        println!("invalid operator id or credential");
                    }
                    Err(err @ SessionError::Store(_)) => {
                        return Err(err).context("credential check failed");
                    }
                }
            }
            (None, _, _) => {}
            _ => println!("usage: login <operator id> <last name> | quit"),
        }
    }
}

fn run(bench: &mut Workbench, lines: &mut Lines) -> anyhow::Result<()> {
    let mut draft: Option<String> = None;

    loop {
        report_scans(bench);
        prompt("> ")?;
        let Some(line) = read_line(lines)? else {
            break;
        };
        report_scans(bench);

        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "help" => println!("{HELP}"),
            "list" => {
                for item in bench.catalog().items() {
                    println!("{}  {}", item.label(), item.quantity());
                }
            }
            "search" => {
                let found = bench.search(arg);
                if found.is_empty() {
                    println!("no matches");
                }
                for item in found {
                    println!("{}", item.label());
                }
            }
            "select" => match parse_id(arg).and_then(|id| bench.select(&id)) {
                Ok(view) => print_selection(&view),
                Err(err) => report(&err),
            },
            "qty" => draft = Some(arg.to_string()),
            "reset" => draft = None,
            "add" | "remove" => {
                let raw = if arg.is_empty() {
                    draft.take().unwrap_or_default()
                } else {
                    draft = None;
                    arg.to_string()
                };
                let Some(item_id) = bench.selected().cloned() else {
                    println!("select an item first");
                    continue;
                };
                let mut ask = |question: &str| confirm(lines, question);
                let outcome = if command == "add" {
                    bench.add(&item_id, &raw, &mut ask)
                } else {
                    bench.remove(&item_id, &raw, &mut ask)
                };
                match outcome {
                    Ok(Outcome::Applied(_)) => {
                        if let Some(line) = bench.recent_changes().last() {
                            println!("{line}");
                        }
                    }
                    Ok(Outcome::Declined) => println!("change cancelled"),
                    Err(err) => report(&err),
                }
            }
            "save" => {
                let mut ask = |question: &str| confirm(lines, question);
                match bench.commit(&mut ask) {
                    Ok(Some(saved)) if saved.is_empty() => println!("nothing to save"),
                    Ok(Some(saved)) => println!("saved {} item(s)", saved.committed.len()),
                    Ok(None) => println!("save cancelled"),
                    Err(err) => report(&err),
                }
            }
            "scan" => match bench.start_scan() {
                Ok(()) => println!("scanning; type 'stop' to cancel"),
                Err(err) => report(&err),
            },
            "stop" => bench.stop_scan(),
            "history" => history(bench, arg),
            "changes" => {
                for line in bench.recent_changes() {
                    println!("{line}");
                }
            }
            "quit" => {
                if bench.ledger().is_empty()
                    || confirm(lines, "Discard unsaved changes and quit?")
                {
                    break;
                }
            }
            other => println!("unknown command {other:?}; type 'help'"),
        }
    }

    bench.stop_scan();
    Ok(())
}

fn parse_id(raw: &str) -> Result<ItemId, WorkbenchError> {
    Ok(raw.parse::<ItemId>()?)
}

fn print_selection(view: &stockroom_desktop::SelectionView) {
    println!("{}", view.label);
    println!("  original quantity: {}", view.original_quantity);
    println!("  new quantity:      {}", view.current_quantity);
}

fn history(bench: &Workbench, arg: &str) {
    let Some(item_id) = bench.selected().cloned() else {
        println!("select an item first");
        return;
    };
    let mut words = arg.split_whitespace();
    let period = match words.next() {
        None | Some("daily") => UsagePeriod::Daily,
        Some("weekly") => UsagePeriod::Weekly,
        Some(other) => {
            println!("unknown period {other:?}; use daily or weekly");
            return;
        }
    };
    let month = match words.next().map(str::parse::<u32>) {
        None => None,
        Some(Ok(m)) if (1..=12).contains(&m) => Some(m),
        Some(_) => {
            println!("month must be 1-12");
            return;
        }
    };

    match bench.usage_report(&item_id, period, month) {
        Ok(points) if points.is_empty() => println!("no changes recorded"),
        Ok(points) => {
            for point in points {
                println!(
                    "{}  {:+}  ({} change(s))",
                    point.bucket_start, point.total_change, point.entries
                );
            }
        }
        Err(err) => report(&err),
    }
}

fn report_scans(bench: &mut Workbench) {
    for event in bench.poll_scan() {
        match event {
            ScanEvent::Resolved(result) => match result.item_id.as_ref() {
                Some(item_id) => match bench.view(item_id) {
                    Ok(view) if bench.selected() == Some(item_id) => print_selection(&view),
                    _ => println!("scanned {item_id}, which is not in the catalog"),
                },
                None => println!("scanned code {:?} did not resolve", result.raw_payload),
            },
            ScanEvent::Failed(err) => println!("scan stopped: {err}"),
        }
    }
}

fn report(err: &WorkbenchError) {
    match err {
        WorkbenchError::Domain(e) if e.is_user_correctable() => println!("warning: {e}"),
        WorkbenchError::Commit(CommitError::CommitFailed(e)) => {
            println!("error: save failed ({e}); changes kept, run 'save' to retry")
        }
        other => println!("error: {other}"),
    }
}
