use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crisis_map::NoopPublisher;
use interview::{
    interval::{reporting_offset, DEFAULT_UTC_OFFSET_HOURS},
    Clock, CommandRouter, InterviewContext, MessageCatalog,
};
use locations::{LocationCatalog, LocationNode};
use shared::{
    domain::SurveyId,
    protocol::{InboundMessage, NewSurvey},
};
use storage::Storage;
use tracing_subscriber::EnvFilter;

mod wards;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/interviews.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a survey from a JSON file.
    CreateSurvey {
        #[arg(long)]
        file: PathBuf,
    },
    ListSurveys,
    DeactivateSurvey {
        survey_id: i64,
    },
    /// Convert the wards CSV export into a location catalog JSON file.
    ImportWards {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Load a location catalog and print a summary of it.
    CheckLocations {
        #[arg(long)]
        file: PathBuf,
    },
    /// Run one inbound message through the interview and print the reply.
    Simulate {
        #[arg(long)]
        survey_id: i64,
        #[arg(long)]
        phone: String,
        #[arg(long, default_value = "./data/locations.json")]
        locations: PathBuf,
        #[arg(long)]
        messages: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_UTC_OFFSET_HOURS, allow_negative_numbers = true)]
        utc_offset_hours: i32,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::ImportWards { csv, out } => {
            let input = fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let import = wards::build_catalog(input)?;
            let json = serde_json::to_string_pretty(&import.catalog)?;
            fs::write(&out, json).with_context(|| format!("failed to write {}", out.display()))?;
            LocationCatalog::load(&out)?;
            println!(
                "processed {} rows, {} wards, wrote {}",
                import.rows,
                import.wards,
                out.display()
            );
        }
        Command::CheckLocations { file } => {
            let catalog = LocationCatalog::load(&file)?;
            let mut counts = Vec::new();
            count_levels(catalog.root(), 0, &mut counts);
            for (depth, (level_name, count)) in counts.iter().enumerate() {
                println!("level {depth}: {count} {level_name}");
            }
        }
        Command::CreateSurvey { file } => {
            let storage = Storage::new(&cli.database_url).await?;
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let new_survey: NewSurvey = serde_json::from_str(&raw)
                .with_context(|| format!("invalid survey in {}", file.display()))?;
            anyhow::ensure!(!new_survey.questions.is_empty(), "survey has no questions");
            let survey = storage.create_survey(&new_survey).await?;
            println!(
                "created survey_id={} questions={}",
                survey.id.0,
                survey.questions.len()
            );
        }
        Command::ListSurveys => {
            let storage = Storage::new(&cli.database_url).await?;
            for survey in storage.list_active_surveys().await? {
                let linked = survey
                    .map
                    .as_ref()
                    .map(|map| format!(" map={}.{}", map.map_id, map.topic_id))
                    .unwrap_or_default();
                println!(
                    "{}\t{}\tquestions={}{linked}",
                    survey.id.0,
                    survey.name,
                    survey.questions.len()
                );
            }
        }
        Command::DeactivateSurvey { survey_id } => {
            let storage = Storage::new(&cli.database_url).await?;
            if storage.deactivate_survey(SurveyId(survey_id)).await? {
                println!("deactivated survey_id={survey_id}");
            } else {
                anyhow::bail!("survey {survey_id} not found");
            }
        }
        Command::Simulate {
            survey_id,
            phone,
            locations,
            messages,
            utc_offset_hours,
            text,
        } => {
            let storage = Storage::new(&cli.database_url).await?;
            let messages = match messages {
                Some(path) => MessageCatalog::load(path)?,
                None => MessageCatalog::english(),
            };
            let ctx = InterviewContext {
                store: Arc::new(storage),
                catalog: Arc::new(LocationCatalog::load(&locations)?),
                messages: Arc::new(messages),
                publisher: Arc::new(NoopPublisher),
                clock: Clock::System,
                reporting_offset: reporting_offset(utc_offset_hours)
                    .context("invalid UTC offset")?,
            };
            let turn = CommandRouter::new(ctx)
                .handle(&InboundMessage {
                    from_number: phone,
                    body_text: text.join(" "),
                    survey_id: SurveyId(survey_id),
                })
                .await;
            println!("{}", turn.reply);
            if let Some(command) = turn.command {
                eprintln!("(waiting in {command}, step {})", turn.next_step);
            }
        }
    }

    Ok(())
}

fn count_levels(node: &LocationNode, depth: usize, counts: &mut Vec<(String, usize)>) {
    if node.children.is_empty() {
        return;
    }
    if counts.len() <= depth {
        counts.push((node.child_level_name.clone(), 0));
    }
    counts[depth].1 += node.children.len();
    for child in &node.children {
        count_levels(child, depth + 1, counts);
    }
}
