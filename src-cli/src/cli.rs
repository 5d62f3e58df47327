use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pqb_core::domain::DifficultyLabel;
use serde::Serialize;

use crate::{GenerateInput, VerifyInput};

#[derive(Parser, Debug)]
#[command(
    name = "pqb",
    version,
    about = "Build a human-verified question/evidence benchmark from a paper corpus."
)]
pub struct Cli {
    /// TOML configuration file (defaults to ./pqb.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show counts and locations of the workspace.
    Status,
    /// Chunk every paper in the corpus directory.
    Ingest {
        /// Re-chunk papers that already have chunks.
        #[arg(long)]
        force: bool,
    },
    /// Build or refresh the vector index over all chunks.
    BuildIndex,
    /// Propose candidate questions for a paper.
    Generate {
        #[arg(long)]
        paper: String,
        #[arg(long)]
        count: Option<usize>,
        /// Regenerate a single question for this profile label.
        #[arg(long)]
        profile: Option<String>,
        #[arg(long, default_value_t = 0)]
        slot: usize,
        #[arg(long, default_value = "")]
        feedback: String,
        /// Accept every generated question into the unverified collection.
        #[arg(long)]
        accept: bool,
    },
    /// Accept a question written by hand.
    Accept {
        #[arg(long)]
        paper: String,
        #[arg(long)]
        text: String,
        #[arg(long, value_parser = parse_difficulty, default_value = "single_hop")]
        difficulty: DifficultyLabel,
    },
    /// List unverified (default) or verified questions.
    List {
        #[arg(long)]
        verified: bool,
    },
    /// Rank chunks against a query.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Show retrieval candidates and the proposed evidence for a question.
    Review {
        question_id: String,
        /// Also draft a ground truth from the proposed evidence.
        #[arg(long)]
        draft: bool,
    },
    /// Verify a question with ordered golden evidence.
    Verify {
        question_id: String,
        /// Comma-separated chunk ids, most important first.
        #[arg(long, value_delimiter = ',')]
        evidence: Vec<String>,
        #[arg(long)]
        ground_truth: Option<String>,
        /// Draft the ground truth from the selected evidence.
        #[arg(long)]
        draft: bool,
        #[arg(long, value_parser = parse_difficulty)]
        difficulty: Option<DifficultyLabel>,
        #[arg(long, default_value = "")]
        notes: String,
        /// Replace the accepted wording.
        #[arg(long)]
        question_text: Option<String>,
        /// Allow evidence outside the retrieval candidates.
        #[arg(long)]
        manual_evidence: bool,
    },
    /// Discard an unverified question.
    Reject { question_id: String },
    /// Flag an unverified question for revision.
    Revise {
        question_id: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Write the verified dataset as CSV and JSONL.
    Export {
        #[arg(long)]
        dest: PathBuf,
    },
    /// Print recorded lifecycle events.
    Audit {
        #[arg(long)]
        question_id: Option<String>,
    },
    /// Check that the local Ollama server answers.
    Health,
}

fn parse_difficulty(raw: &str) -> Result<DifficultyLabel, String> {
    DifficultyLabel::try_from(raw.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let cfg = crate::load_config(self.config.as_deref())?;
        if let Command::Health = self.command {
            return print_json(&crate::ai_health_check(&cfg));
        }

        let ws = crate::open_workspace(cfg).context("failed to open workspace")?;
        tracing::debug!(command = ?self.command, "running command");
        match self.command {
            Command::Status => print_json(&crate::status(&ws)?),
            Command::Ingest { force } => print_json(&crate::ingest(&ws, force)?),
            Command::BuildIndex => print_json(&crate::build_index(&ws)?),
            Command::Generate {
                paper,
                count,
                profile,
                slot,
                feedback,
                accept,
            } => print_json(&crate::generate(
                &ws,
                GenerateInput {
                    paper_id: paper,
                    count,
                    profile,
                    slot,
                    feedback,
                    accept,
                },
            )?),
            Command::Accept {
                paper,
                text,
                difficulty,
            } => print_json(&crate::accept(&ws, &paper, &text, difficulty)?),
            Command::List { verified: true } => print_json(&crate::list_verified(&ws)?),
            Command::List { verified: false } => print_json(&crate::list_unverified(&ws)?),
            Command::Search { query, top_k } => print_json(&crate::search(&ws, &query, top_k)?),
            Command::Review { question_id, draft } => {
                print_json(&crate::review(&ws, &question_id, draft)?)
            }
            Command::Verify {
                question_id,
                evidence,
                ground_truth,
                draft,
                difficulty,
                notes,
                question_text,
                manual_evidence,
            } => print_json(&crate::verify(
                &ws,
                VerifyInput {
                    question_id,
                    evidence,
                    ground_truth,
                    draft,
                    difficulty,
                    notes,
                    question_text,
                    manual_evidence,
                },
            )?),
            Command::Reject { question_id } => print_json(&crate::reject(&ws, &question_id)?),
            Command::Revise { question_id, notes } => {
                print_json(&crate::revise(&ws, &question_id, &notes)?)
            }
            Command::Export { dest } => print_json(&crate::export(&ws, &dest)?),
            Command::Audit { question_id } => {
                print_json(&crate::audit_log(&ws, question_id.as_deref())?)
            }
            Command::Health => Ok(()),
        }
    }
}
