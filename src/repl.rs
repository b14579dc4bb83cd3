//! Console chat
//!
//! Line-oriented host for the chat session. Plain lines are asked as
//! questions; `/upload <path>`, `/new` and `/quit` drive the session.
//! Replies are printed from the snapshot stream as they settle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{ChartData, Message, MessageBody, MessageId, Role, TableData};
use crate::queue::{ChatHandle, ChatSnapshot, QueueError};
use crate::storage::UploadFile;

const HELP: &str = "Commands: /upload <file.csv>, /new, /quit. Anything else is asked as a question.";

#[derive(Debug, PartialEq)]
enum Input<'a> {
    Ask(&'a str),
    Upload(&'a str),
    NewChat,
    Help,
    Quit,
    Blank,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        _ if line.is_empty() => Input::Blank,
        Some(("/upload", path)) => Input::Upload(path.trim()),
        None if line == "/upload" => Input::Upload(""),
        None if line == "/new" => Input::NewChat,
        None if line == "/quit" || line == "/exit" => Input::Quit,
        None if line == "/help" => Input::Help,
        _ => Input::Ask(line),
    }
}

pub async fn run(chat: ChatHandle, dataset: Option<PathBuf>) -> anyhow::Result<()> {
    println!("{}", HELP);
    let printer = spawn_transcript_printer(&chat);

    if let Some(path) = dataset {
        upload(&chat, &path).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Blank => {}
            Input::Quit => break,
            Input::Help => println!("{}", HELP),
            Input::NewChat => {
                chat.reset().await?;
                println!("-- new chat --");
            }
            Input::Upload("") => println!("usage: /upload <file.csv>"),
            Input::Upload(path) => upload(&chat, Path::new(path)).await,
            Input::Ask(question) => match chat.ask(question).await {
                Ok(_) => {}
                Err(QueueError::NoDataset) => println!("Upload a CSV file first: /upload <file.csv>"),
                Err(err) => println!("! {}", err),
            },
        }
    }

    printer.abort();
    Ok(())
}

async fn upload(chat: &ChatHandle, path: &Path) {
    let file = match UploadFile::from_path(path).await {
        Ok(file) => file,
        Err(err) => {
            println!("! {}", err);
            return;
        }
    };

    let mut progress = chat.watch_progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let percentage = progress.borrow_and_update().percentage();
            if let Some(percentage) = percentage {
                println!("uploading... {}%", percentage);
            }
        }
    });

    if let Err(err) = chat.upload(file).await {
        println!("! {}", err);
    }
    reporter.abort();
}

fn spawn_transcript_printer(chat: &ChatHandle) -> JoinHandle<()> {
    let mut snapshots = chat.subscribe();
    tokio::spawn(async move {
        let mut transcript = Transcript::default();
        loop {
            let snapshot: Arc<ChatSnapshot> = snapshots.borrow_and_update().clone();
            for line in transcript.advance(&snapshot) {
                println!("{}", line);
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Tracks what has been printed so each snapshot only emits new lines.
#[derive(Default)]
struct Transcript {
    session: Option<Uuid>,
    last_printed: Option<MessageId>,
    last_error: Option<String>,
    loading: bool,
}

impl Transcript {
    fn advance(&mut self, snapshot: &ChatSnapshot) -> Vec<String> {
        let session = &snapshot.session;
        if self.session != Some(session.id) {
            *self = Self {
                session: Some(session.id),
                ..Self::default()
            };
        }

        let mut out = Vec::new();
        for message in &session.messages {
            if self.last_printed.is_some_and(|last| message.id <= last) {
                continue;
            }
            // Questions were typed by the user; only echo replies.
            if message.role == Role::Assistant {
                out.push(render(message));
            }
            self.last_printed = Some(message.id);
        }

        if session.is_loading && !self.loading {
            out.push("...".to_string());
        }
        self.loading = session.is_loading;

        if session.last_error != self.last_error {
            if let Some(err) = &session.last_error {
                out.push(format!("! {}", err));
            }
            self.last_error = session.last_error.clone();
        }
        out
    }
}

pub fn render(message: &Message) -> String {
    let prefix = match message.role {
        Role::User => "you",
        Role::Assistant => "bot",
    };
    match &message.body {
        MessageBody::Text => format!("{}> {}", prefix, message.content),
        MessageBody::Chart(chart) => format!("{}> {}\n{}", prefix, message.content, render_chart(chart)),
        MessageBody::Table(table) => format!("{}> {}\n{}", prefix, message.content, render_table(table)),
    }
}

fn render_chart(chart: &ChartData) -> String {
    let mut lines = vec![format!("[{} chart] {}", chart.kind, chart.title)];
    let width = chart.series.iter().map(|p| p.label.chars().count()).max().unwrap_or(0);
    lines.extend(
        chart
            .series
            .iter()
            .map(|point| format!("  {:<width$}  {}", point.label, point.value, width = width)),
    );
    lines.join("\n")
}

fn render_table(table: &TableData) -> String {
    let mut lines = vec![table.headers.join("\t")];
    lines.extend(table.rows.iter().map(|row| {
        row.iter()
            .map(|cell| cell.to_string())
            .collect::<Vec<_>>()
            .join("\t")
    }));
    lines.join("\n")
}
