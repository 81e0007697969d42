use std::sync::Arc;

use anyhow::{bail, Context, Result};

use scrollcache_core::cache::format_age;
use scrollcache_core::{
    AdminCommand, AdminMessage, AdminReply, ChapterView, InstallReport, Reader, Request, Response, ServiceWorker,
};

use crate::cli::{CacheAction, Command};

pub async fn run(worker: &Arc<ServiceWorker>, command: Command) -> Result<()> {
    match command {
        Command::Install => install(worker).await,
        Command::Read { book, chapter } => read(worker, &book, chapter).await,
        Command::Fetch { path, navigate } => fetch(worker, &path, navigate).await,
        Command::Cache { action } => cache(worker, action).await,
        Command::Status => status(worker).await,
        Command::Books => {
            books(worker);
            Ok(())
        }
    }
}

async fn install(worker: &ServiceWorker) -> Result<()> {
    let (installed, activated) = worker.install_and_activate().await?;
    print_install_report(&installed);
    if !activated.deleted.is_empty() {
        println!("Removed stale partitions: {}", activated.deleted.join(", "));
    }
    println!("Version {} active", worker.cache().version());
    Ok(())
}

fn print_install_report(report: &InstallReport) {
    let populated = &report.populated;
    println!(
        "Cached {} shell files and {} chapters ({} of {} succeeded)",
        populated.shell_stored,
        populated.content_stored,
        populated.stored(),
        populated.attempted()
    );
    if !populated.failed.is_empty() {
        println!("Failed ({}):", populated.failed.len());
        for file in &populated.failed {
            println!("  {}", file);
        }
    }
}

async fn read(worker: &Arc<ServiceWorker>, book: &str, chapter: u32) -> Result<()> {
    let reader = Reader::new(Arc::clone(worker));
    let title = reader.book(book)?.title.clone();
    match reader.open(book, chapter).await? {
        ChapterView::Text(text) => {
            println!("{} {}\n", title, chapter);
            println!("{}", text);
        }
        ChapterView::Empty => println!("{} {} is empty.", title, chapter),
        ChapterView::Unavailable => {
            println!("{} {} is not available offline. Connect and try again.", title, chapter)
        }
        ChapterView::Superseded => {}
    }
    Ok(())
}

async fn fetch(worker: &ServiceWorker, path: &str, navigate: bool) -> Result<()> {
    let request = if navigate {
        Request::navigate(worker.scope(), path)?
    } else {
        Request::get(worker.scope(), path)?
    };
    let response = worker.fetch(&request).await;
    print_response(&request, &response);
    Ok(())
}

fn print_response(request: &Request, response: &Response) {
    eprintln!(
        "{} {} ({:?}{})",
        response.status,
        request.key(),
        response.source,
        response
            .header(scrollcache_core::http::FALLBACK_HEADER)
            .map(|kind| format!(", fallback {}", kind))
            .unwrap_or_default()
    );
    if let Some(content_type) = response.content_type() {
        eprintln!("content-type: {}", content_type);
    }
    println!("{}", response.text());
}

async fn cache(worker: &ServiceWorker, action: CacheAction) -> Result<()> {
    let command = match action {
        CacheAction::Size => AdminCommand::GetCacheSize,
        CacheAction::Clear => AdminCommand::ClearCache,
        CacheAction::Update => AdminCommand::UpdateCache,
    };
    let (message, reply) = AdminMessage::command(command);
    worker.message(message).await;
    let reply: AdminReply = reply.await.context("Worker dropped the admin reply")?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    if !reply.success {
        bail!("{} failed", command);
    }
    Ok(())
}

async fn status(worker: &ServiceWorker) -> Result<()> {
    let cache = worker.cache();
    let summaries = cache.summaries().await?;
    println!("Cache version {} at {}", cache.version(), worker.scope());
    if summaries.is_empty() {
        println!("No partitions. Run `scrollcache install` first.");
        return Ok(());
    }

    let now = cache.now();
    for summary in summaries {
        let age = summary
            .newest
            .map(|newest| format_age((now - newest).num_minutes()))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<12} {:>5} entries  updated {:<10}{}",
            summary.name,
            summary.entries,
            age,
            if summary.current { "" } else { "  (stale)" }
        );
    }
    Ok(())
}

fn books(worker: &ServiceWorker) {
    for book in &worker.config().books {
        println!("{:<12} {:<12} {} chapters", book.key, book.title, book.chapters);
    }
}
