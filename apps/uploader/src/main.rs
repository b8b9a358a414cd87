//! docview-uploader: Upload → Analyze → Poll from the command line
//!
//! Drives the same orchestrator a browser session would: files are uploaded
//! concurrently, optionally submitted for analysis, and the processing set
//! is polled until it drains. Interrupted runs resume with `status`.

mod config;

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use config::UploaderConfig;
use docview_core::documents::tag_suggestions;
use docview_core::faces::{confirmed_names, save_face};
use docview_core::processing::AnalyzeOutcome;
use docview_core::telemetry::init_logging;
use docview_core::{
    BackendClient, DocumentQuery, FaceAnalysis, HttpBackend, Orchestrator, OrchestratorEvent,
    PersonCondition, ProcessingEvent, UploadEvent, UploadFile, UploadStatus,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "docview-uploader")]
#[command(about = "Upload documents, submit them for analysis and follow processing")]
#[command(version)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Submit successful uploads for analysis
        #[arg(short, long)]
        analyze: bool,

        /// Wait until analysis has finished
        #[arg(short, long, requires = "analyze")]
        wait: bool,
    },

    /// Resume polling documents left processing by a previous run
    Status,

    /// List documents
    List {
        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(short, long)]
        search: Option<String>,

        /// Tag filter (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,

        /// Person filter (repeatable)
        #[arg(long)]
        person: Vec<String>,

        /// Require all persons instead of any
        #[arg(long)]
        all_persons: bool,

        /// Earliest date, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,

        /// Latest date, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,

        /// Print the raw page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or edit tags; without a document lists every tag
    Tags {
        doc_id: Option<i64>,

        #[arg(long, requires = "doc_id")]
        add: Option<String>,

        #[arg(long, requires = "doc_id")]
        remove: Option<String>,

        /// Suggest existing tags containing this text
        #[arg(long, requires = "doc_id")]
        suggest: Option<String>,
    },

    /// Detect faces in a document image and name them
    Faces {
        doc_id: i64,

        /// Name a face as INDEX=NAME (repeatable); replaces the suggestion
        #[arg(long = "name", value_parser = parse_face_name)]
        names: Vec<(u32, String)>,

        /// Register the faces named with --name
        #[arg(long)]
        save: bool,

        /// Write all confirmed names into the document abstract
        #[arg(long)]
        update_abstract: bool,
    },

    /// Drop the backend thumbnail cache
    ClearCache,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,uploader=info",
        1 => "info",
        _ => "debug",
    };
    init_logging(filter)?;

    let config = UploaderConfig::load();

    match cli.command {
        Commands::Upload {
            files,
            analyze,
            wait,
        } => upload(&config, files, analyze, wait).await,
        Commands::Status => status(&config).await,
        Commands::List {
            page,
            search,
            tag,
            person,
            all_persons,
            from,
            to,
            json,
        } => {
            let mut query = DocumentQuery::default();
            if let Some(search) = search {
                query = query.with_search(search);
            }
            query.page = page.max(1);
            for t in tag {
                query = query.with_tag(t);
            }
            let condition = if all_persons {
                PersonCondition::All
            } else {
                PersonCondition::Any
            };
            query = query.with_persons(person, condition).with_date_range(
                from.as_deref().map(|d| parse_day(d, false)).transpose()?,
                to.as_deref().map(|d| parse_day(d, true)).transpose()?,
            );
            list(&config, &query, json).await
        }
        Commands::Tags {
            doc_id,
            add,
            remove,
            suggest,
        } => tags(&config, doc_id, add, remove, suggest).await,
        Commands::Faces {
            doc_id,
            names,
            save,
            update_abstract,
        } => faces(&config, doc_id, names, save, update_abstract).await,
        Commands::ClearCache => {
            HttpBackend::new(&config.backend)?.clear_cache().await?;
            println!("Thumbnail cache cleared");
            Ok(())
        }
    }
}

/// Start or end of the given day
fn parse_day(day: &str, end_of_day: bool) -> CliResult<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{}': {}", day, e))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.ok_or_else(|| format!("Invalid date '{}'", day).into())
}

async fn upload(
    config: &UploaderConfig,
    paths: Vec<PathBuf>,
    analyze: bool,
    wait: bool,
) -> CliResult<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(UploadFile::from_path(path).await?);
    }

    let orchestrator = Orchestrator::from_config(&config.backend, &config.orchestrator)?;
    let resumed = orchestrator.start();
    if resumed > 0 {
        info!(target: "uploader", resumed, "Still tracking documents from a previous run");
    }
    let printer = spawn_printer(&orchestrator);

    orchestrator.enqueue(files);
    orchestrator.start_upload().await;

    for task in orchestrator.tasks() {
        match task.status {
            UploadStatus::Success => println!(
                "{}  uploaded as document {}",
                task.file.name,
                task.doc_id.unwrap_or_default()
            ),
            _ => println!(
                "{}  failed: {}",
                task.file.name,
                task.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    if analyze {
        match orchestrator.analyze_uploaded().await {
            AnalyzeOutcome::Skipped => println!("Nothing to analyze"),
            AnalyzeOutcome::Submitted => println!("Submitted for analysis"),
            AnalyzeOutcome::RolledBack(ids) => {
                println!("Could not reach the backend; {} document(s) not submitted", ids.len())
            }
            AnalyzeOutcome::Unacknowledged(error) => {
                println!("Backend reported an error ({}); still tracking", error)
            }
        }
        if wait {
            orchestrator.wait_until_idle().await;
            println!("Processing finished");
        }
    }

    orchestrator.shutdown();
    printer.abort();

    let counts = orchestrator.queue().counts();
    if counts.error > 0 {
        return Err(format!("{} upload(s) failed", counts.error).into());
    }
    Ok(())
}

async fn status(config: &UploaderConfig) -> CliResult<()> {
    let orchestrator = Orchestrator::from_config(&config.backend, &config.orchestrator)?;
    let printer = spawn_printer(&orchestrator);

    if orchestrator.start() == 0 {
        println!("No documents are processing");
        printer.abort();
        return Ok(());
    }
    println!("Processing: {:?}", orchestrator.tracker().ids());

    orchestrator.wait_until_idle().await;
    orchestrator.shutdown();
    printer.abort();
    println!("Processing finished");
    Ok(())
}

/// `INDEX=NAME`
fn parse_face_name(raw: &str) -> Result<(u32, String), String> {
    let (index, name) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=NAME, got '{}'", raw))?;
    let index = index
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid face index '{}': {}", index, e))?;
    Ok((index, name.to_string()))
}

/// Suggested names with the user's names laid over them
fn face_names(
    analysis: &FaceAnalysis,
    named: &[(u32, String)],
) -> CliResult<BTreeMap<u32, String>> {
    let mut names = analysis.suggested_names();
    for (index, name) in named {
        if analysis.face(*index).is_none() {
            return Err(format!("No face with index {}", index).into());
        }
        names.insert(*index, name.clone());
    }
    Ok(names)
}

async fn faces(
    config: &UploaderConfig,
    doc_id: i64,
    named: Vec<(u32, String)>,
    save: bool,
    update_abstract: bool,
) -> CliResult<()> {
    let backend = HttpBackend::new(&config.backend)?;
    let image = backend.document_image(doc_id).await?;
    let analysis = backend
        .analyze_image(&format!("{}.jpg", doc_id), image)
        .await?;
    let names = face_names(&analysis, &named)?;

    if analysis.faces.is_empty() {
        println!("No faces found");
    }
    for face in &analysis.faces {
        println!(
            "{:>3}  {:<30}  {}",
            face.index,
            names.get(&face.index).map(String::as_str).unwrap_or("?"),
            face.distance.map(|d| format!("{:.2}", d)).unwrap_or_default()
        );
    }

    if save {
        for (index, name) in &named {
            if let Some(face) = analysis.face(*index) {
                save_face(&backend, &analysis, face, name).await?;
                println!("Saved face {} as {}", index, name.trim());
            }
        }
    }

    if update_abstract {
        backend
            .update_abstract(doc_id, &confirmed_names(&names))
            .await?;
        println!("Abstract updated");
    }
    Ok(())
}

/// Print processing changes while the orchestrator works
fn spawn_printer(orchestrator: &Orchestrator) -> tokio::task::JoinHandle<()> {
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::Processing(ProcessingEvent::Updated { processing }) => {
                    println!("  processing: {:?}", processing)
                }
                OrchestratorEvent::Processing(ProcessingEvent::PollFailed { error }) => {
                    warn!(target: "uploader", error = %error, "Stopped checking processing status")
                }
                OrchestratorEvent::Processing(ProcessingEvent::SubmissionRolledBack {
                    doc_ids,
                }) => {
                    warn!(target: "uploader", doc_ids = ?doc_ids, "Submission rolled back")
                }
                OrchestratorEvent::Upload(UploadEvent::Finished { id, status }) => {
                    info!(target: "uploader", id = %id, status = %status, "Upload finished")
                }
                _ => {}
            }
        }
    })
}

async fn list(config: &UploaderConfig, query: &DocumentQuery, json: bool) -> CliResult<()> {
    let backend = HttpBackend::new(&config.backend)?;
    let page = backend.list_documents(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    for doc in &page.documents {
        println!(
            "{:>6}  {:<40}  {:<10}  {}",
            doc.doc_id,
            doc.title,
            doc.date,
            doc.tags.join(", ")
        );
    }
    println!("page {} of {}", query.page, page.total_pages.max(1));
    Ok(())
}

async fn tags(
    config: &UploaderConfig,
    doc_id: Option<i64>,
    add: Option<String>,
    remove: Option<String>,
    suggest: Option<String>,
) -> CliResult<()> {
    let backend = HttpBackend::new(&config.backend)?;

    let Some(doc_id) = doc_id else {
        for tag in backend.list_tags().await? {
            println!("{}", tag);
        }
        return Ok(());
    };

    if let Some(tag) = add {
        backend.add_tag(doc_id, &tag).await?;
    }
    if let Some(tag) = remove {
        backend.remove_tag(doc_id, &tag).await?;
    }

    let current = backend.document_tags(doc_id).await?;
    if let Some(input) = suggest {
        let all = backend.list_tags().await?;
        for tag in tag_suggestions(&all, &current, &input) {
            println!("{}", tag);
        }
        return Ok(());
    }

    println!("{}: {}", doc_id, current.join(", "));
    Ok(())
}
