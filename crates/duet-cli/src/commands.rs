use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use duet_core::answer::{LlmResponder, TempMode};
use duet_core::export::export_jsonl;
use duet_core::judge::heuristic::HeuristicJudge;
use duet_core::judge::LlmJudge;
use duet_core::providers::fake::FakeClient;
use duet_core::providers::gemini::GeminiClient;
use duet_core::rewrite::LlmRewriter;
use duet_core::{Controller, CoreConfig, Role, Store};
use serde_json::json;

use crate::args::{Cli, Command, ProviderArg};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let controller = build_controller(&cli)?;

    match cli.cmd {
        Command::Submit(args) => {
            let id = controller.submit(&args.prompt)?;
            println!("{id}");
        }
        Command::Advance(args) => {
            let snapshot = if args.all {
                controller.run_to_completion(&args.id).await?
            } else {
                controller.advance(&args.id).await?
            };
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Run(args) => {
            let id = controller.submit(&args.prompt)?;
            let snapshot = controller.run_to_completion(&id).await?;
            let out = json!({ "experiment_id": id, "snapshot": snapshot });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::View(args) => {
            let role = Role::parse(&args.role, &args.rater);
            let view = controller.view(&args.id, &role)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Rate(args) => {
            let rating_id = controller.submit_rating(
                &args.response,
                &args.rater,
                args.score,
                args.comment.as_deref(),
            )?;
            println!("{rating_id}");
        }
        Command::List(args) => {
            let experiments =
                controller.list(args.status.map(Into::into), args.limit, args.offset)?;
            println!("{}", serde_json::to_string_pretty(&experiments)?);
        }
        Command::Export(args) => {
            let status = args.status.map(Into::into);
            let written = match &args.out {
                Some(path) => {
                    let mut file = File::create(path)
                        .with_context(|| format!("create {}", path.display()))?;
                    let written = export_jsonl(controller.store(), status, &mut file)?;
                    file.flush()?;
                    written
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut lock = stdout.lock();
                    export_jsonl(controller.store(), status, &mut lock)?
                }
            };
            eprintln!("exported {written} experiments");
        }
    }
    Ok(())
}

fn build_controller(cli: &Cli) -> anyhow::Result<Controller> {
    tracing::debug!(db = %cli.db.display(), provider = ?cli.provider, "opening store");
    let store = Store::open(&cli.db)
        .with_context(|| format!("open database {}", cli.db.display()))?;
    store.init_schema()?;

    let config = CoreConfig::default();
    let controller = match cli.provider {
        ProviderArg::Gemini => {
            let client = Arc::new(GeminiClient::from_env()?);
            Controller::new(
                store,
                Arc::new(LlmRewriter::new(client.clone())),
                Arc::new(LlmResponder::new(client.clone(), TempMode::Auto)),
                Arc::new(LlmJudge::new(client)),
                config,
            )
        }
        ProviderArg::Fake => {
            let client = Arc::new(FakeClient::new());
            Controller::new(
                store,
                Arc::new(LlmRewriter::new(client.clone())),
                Arc::new(LlmResponder::new(client, TempMode::Auto)),
                // No usable LLM behind the fake provider, so judging
                // falls back to the deterministic heuristic.
                Arc::new(HeuristicJudge),
                config,
            )
        }
    };
    Ok(controller)
}
