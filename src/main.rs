use anyhow::{Context, Result};
use chat_relay::accounts::{Account, AccountStore, CredentialOutcome, StoreError};
use chat_relay::chat::{
    ChatEvent, ChatRelay, RemoteApi, SendOutcome, SendRequest, SendResult, WebChatClient,
};
use chat_relay::config::RelayConfig;
use chat_relay::event_log::EventLog;
use chat_relay::session_bridge::SessionBridge;
use chat_relay::transport::{encode_event, AccountSummary, ApiResponse};
use chat_relay::{logging, relay_paths};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Chat with a remote assistant through stored browser sessions")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CHAT_RELAY_GIT_SHA"), ")"))]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Print the JSON envelope (or SSE frames when streaming)
    #[arg(long, global = true)]
    json: bool,

    /// Write debug-level tracing to the log file
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.chat-relay/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser helper and store the session
    Login {
        /// Override the login timeout
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Inspect and manage stored accounts
    Accounts {
        #[command(subcommand)]
        command: AccountsCommand,
    },
    /// Send a message (all trailing arguments are joined)
    Chat {
        /// Account id (defaults to the active account)
        #[arg(short, long)]
        account: Option<String>,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Parent message within the conversation
        #[arg(short, long)]
        parent: Option<String>,

        /// Print the reply as it arrives
        #[arg(short, long)]
        stream: bool,

        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
}

#[derive(Subcommand)]
enum AccountsCommand {
    /// List every stored account
    List,
    /// Show one account (defaults to the active account)
    Show { id: Option<String> },
    /// Make an account active
    Use { id: String },
    /// Delete an account
    Remove { id: String },
    /// Change an account's display name
    Rename { id: String, name: String },
}

/// Services shared by every command, built once at startup.
struct App {
    json: bool,
    config: RelayConfig,
    store: Arc<AccountStore>,
    event_log: Arc<EventLog>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let app = match App::init(&cli) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("[chat-relay] Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let succeeded = app.run(cli.command).await;
    tracing::debug!(succeeded, "Shutting down");
    app.event_log.flush();

    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

impl App {
    fn init(cli: &Cli) -> Result<Self> {
        logging::init_tracing(&relay_paths::trace_log_path()?, cli.verbose)?;

        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => relay_paths::config_path()?,
        };
        let config = RelayConfig::load_or_default(&config_path)?;

        let store = AccountStore::open(relay_paths::accounts_path()?)
            .context("Failed to open account table")?;
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let event_log = EventLog::new(&invocation_id, &relay_paths::logs_dir()?)?;

        tracing::info!(
            invocation_id = %invocation_id,
            config = %config_path.display(),
            accounts = %store.path().display(),
            "chat-relay starting"
        );

        Ok(Self {
            json: cli.json,
            config,
            store: Arc::new(store),
            event_log: Arc::new(event_log),
        })
    }

    async fn run(&self, command: Commands) -> bool {
        match command {
            Commands::Login { timeout_secs } => self.login(timeout_secs).await,
            Commands::Accounts { command } => self.accounts(command),
            Commands::Chat {
                account,
                conversation,
                parent,
                stream,
                message,
            } => {
                let request = SendRequest {
                    account_id: account,
                    conversation_id: conversation,
                    parent_message_id: parent,
                    text: message.join(" "),
                    streaming: stream,
                };
                self.chat(request).await
            }
        }
    }

    async fn login(&self, timeout_secs: Option<u64>) -> bool {
        let timeout = timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.login.timeout());
        if !self.json {
            println!("Complete the sign-in in the browser window that opens...");
        }

        let bridge = SessionBridge::new(self.config.login.clone()).with_event_log(self.event_log.clone());
        let credential = match bridge.acquire_session(timeout).await {
            Ok(credential) => credential,
            Err(err) => {
                if let (false, Some(diagnostics)) = (self.json, err.diagnostics()) {
                    eprintln!("{}", diagnostics);
                }
                return self.fail(&err);
            }
        };

        match self.store.add_credential(credential) {
            Ok(outcome) => {
                let (action, verb) = match &outcome {
                    CredentialOutcome::Created(_) => ("created", "Added"),
                    CredentialOutcome::Refreshed(_) => ("refreshed", "Refreshed"),
                };
                let account = outcome.account();
                self.event_log.log_account_change(action, &account.id);
                let summary = self.summarize(account);
                self.succeed(&summary, || {
                    println!("{} account {} ({})", verb, summary.display_name, summary.id)
                })
            }
            Err(err) => self.fail(&err),
        }
    }

    fn accounts(&self, command: AccountsCommand) -> bool {
        match command {
            AccountsCommand::List => match self.store.list() {
                Ok(accounts) => {
                    let summaries: Vec<AccountSummary> =
                        accounts.iter().map(|a| self.summarize(a)).collect();
                    self.succeed(&summaries, || print_account_table(&summaries))
                }
                Err(err) => self.fail(&err),
            },
            AccountsCommand::Show { id } => {
                let found = match id {
                    Some(id) => self.store.require(&id),
                    None => self.store.active().and_then(|active| {
                        active.ok_or_else(|| StoreError::NotFound {
                            id: "(active)".to_string(),
                        })
                    }),
                };
                match found {
                    Ok(account) => {
                        let summary = self.summarize(&account);
                        self.succeed(&summary, || print_account_details(&summary))
                    }
                    Err(err) => self.fail(&err),
                }
            }
            AccountsCommand::Use { id } => self.account_change("activated", &id, self.store.set_active(&id)),
            AccountsCommand::Remove { id } => self.account_change("removed", &id, self.store.remove(&id)),
            AccountsCommand::Rename { id, name } => {
                self.account_change("renamed", &id, self.store.rename(&id, &name))
            }
        }
    }

    /// Reports a boolean store mutation; `false` means the id was unknown.
    fn account_change(&self, action: &str, id: &str, result: Result<bool, StoreError>) -> bool {
        match result {
            Ok(true) => {
                self.event_log.log_account_change(action, id);
                self.succeed(&serde_json::json!({ "id": id }), || {
                    println!("Account {} {}", id, action)
                })
            }
            Ok(false) => self.fail(&StoreError::NotFound { id: id.to_string() }),
            Err(err) => self.fail(&err),
        }
    }

    async fn chat(&self, request: SendRequest) -> bool {
        let remote: Arc<dyn RemoteApi> = Arc::new(WebChatClient::new(&self.config.api));
        let relay = ChatRelay::new(self.store.clone(), remote, self.config.api.default_model.clone())
            .with_event_log(self.event_log.clone());

        match relay.send(request).await {
            Ok(SendOutcome::Buffered(result)) => {
                self.succeed(&result, || println!("{}", result.content))
            }
            Ok(SendOutcome::Streaming(mut rx)) => {
                let mut succeeded = false;
                while let Some(event) = rx.recv().await {
                    if let ChatEvent::Done(_) = &event {
                        succeeded = true;
                    }
                    self.print_event(&event);
                }
                succeeded
            }
            Err(err) => self.fail(&err),
        }
    }

    fn print_event(&self, event: &ChatEvent) {
        let mut stdout = std::io::stdout().lock();
        if self.json {
            let _ = stdout.write_all(encode_event(event).as_bytes());
        } else {
            match event {
                ChatEvent::Metadata(conversation) => {
                    tracing::debug!(conversation_id = %conversation.conversation_id, "Stream opened");
                }
                ChatEvent::Delta(text) => {
                    let _ = stdout.write_all(text.as_bytes());
                }
                ChatEvent::Done(result) => {
                    let _ = writeln!(stdout);
                    print_usage_footer(result);
                }
                ChatEvent::Error(message) => {
                    let _ = writeln!(stdout);
                    eprintln!("[chat-relay] Error: {}", message);
                }
            }
        }
        let _ = stdout.flush();
    }

    fn summarize(&self, account: &Account) -> AccountSummary {
        let active_id = self.store.active().ok().flatten().map(|a| a.id);
        AccountSummary::new(
            account,
            active_id.as_deref() == Some(account.id.as_str()),
            chrono::Utc::now().date_naive(),
        )
    }

    fn succeed<T: Serialize>(&self, data: &T, human: impl FnOnce()) -> bool {
        if self.json {
            println!("{}", ApiResponse::ok(data).to_json());
        } else {
            human();
        }
        true
    }

    fn fail(&self, err: &dyn Display) -> bool {
        if self.json {
            println!("{}", ApiResponse::<()>::failure(err).to_json());
        } else {
            eprintln!("[chat-relay] Error: {}", err);
        }
        false
    }
}

fn print_account_table(accounts: &[AccountSummary]) {
    if accounts.is_empty() {
        println!("No accounts. Run `chat-relay login` to add one.");
        return;
    }
    println!(
        "  {:<36}  {:<24}  {:>8}  {:>10}  {:>10}",
        "ID", "NAME", "TODAY", "IN", "OUT"
    );
    for account in accounts {
        println!(
            "{} {:<36}  {:<24}  {:>8}  {:>10}  {:>10}",
            if account.active { "*" } else { " " },
            account.id,
            account.display_name,
            account.requests_today,
            account.input_tokens,
            account.output_tokens
        );
    }
}

fn print_account_details(account: &AccountSummary) {
    println!("id:            {}", account.id);
    println!("name:          {}", account.display_name);
    println!("email:         {}", account.email.as_deref().unwrap_or("-"));
    println!("organization:  {}", account.org_id);
    println!("session key:   {}", account.session_key);
    println!("active:        {}", account.active);
    println!("created:       {}", account.created_at);
    println!("last used:     {}", account.last_used_at);
    println!("requests today {}", account.requests_today);
    println!("tokens:        {} in / {} out", account.input_tokens, account.output_tokens);
    if let Some(conversation) = &account.active_conversation_id {
        println!("conversation:  {}", conversation);
    }
}

fn print_usage_footer(result: &SendResult) {
    eprintln!(
        "[conversation {} | {} in / {} out]",
        result.conversation_id, result.input_tokens, result.output_tokens
    );
}
