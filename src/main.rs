use std::path::PathBuf;

use chrono::Utc;
use evidence_collector::{build_collector, open_store, pack_lines, run_files, AppError, CONFIG};
use log::info;

const USAGE: &str = "evidence-collector <notification.json>... | pack <log_group> <lines.txt> | config";

fn main() {
    // Cargar .env si existe antes de configurar el logger
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[evidence-collector] {e}");
            match e {
                AppError::Usage(_) => 2,
                _ => 5,
            }
        }
    };
    std::process::exit(code);
}

fn run(args: &[String]) -> Result<i32, AppError> {
    match args.first().map(String::as_str) {
        None | Some("-h") | Some("--help") => Err(AppError::Usage(USAGE.into())),
        Some("pack") => {
            let (Some(log_group), Some(file)) = (args.get(1), args.get(2)) else {
                return Err(AppError::Usage(USAGE.into()));
            };
            let text = std::fs::read_to_string(file)?;
            let notification = pack_lines(log_group, &text, Utc::now().timestamp_millis())?;
            println!("{}", serde_json::to_string_pretty(&notification)?);
            Ok(0)
        }
        Some("config") => {
            println!("{}", serde_json::to_string_pretty(&*CONFIG)?);
            Ok(0)
        }
        Some(_) => {
            let config = &*CONFIG;
            let store = open_store(&config.destination)?;
            let collector = build_collector(config, store);
            let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
            info!("processing {} notification(s)", paths.len());
            let outcomes = run_files(&collector, &paths);
            for outcome in &outcomes {
                println!("{}", outcome.to_json());
            }
            // 3: al menos una invocación falló
            Ok(if outcomes.iter().all(|o| o.is_ok()) { 0 } else { 3 })
        }
    }
}
