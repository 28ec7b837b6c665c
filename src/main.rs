use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{AuthSession, FirebaseIdentityProvider, IdentityProvider};
use crate::booter::Booter;
use crate::client::{ApiClient, DEFAULT_API_URL};
use crate::config::Config;
use crate::core::caption::{CaptionParams, CaptionStyle};
use crate::core::data_url::SelectedFile;
use crate::core::gemini::GeminiCaptionClient;
use crate::core::hashtags::generate_hashtags;
use crate::core::session::{CaptionSession, WorkflowObserver};
use crate::core::validation::is_accepted_type;
use crate::core::workflow::{Event, Notification, NotificationLevel, Phase};
use crate::server::build_router;
use crate::server::types::AppState;
use crate::store::{HistoryStore, InMemoryHistoryStore, PlanetScaleHistoryStore};
use crate::utils::constants::HISTORY_LIMIT;
use crate::utils::telemetry::init_tracing;

pub mod auth;
pub mod booter;
pub mod client;
pub mod config;
pub mod core;
pub mod governor_conf;
pub mod server;
pub mod store;
pub mod utils;

#[derive(Parser)]
#[command(name = "captionator", about = "Image captioning server and client", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Caption an image file through a running server
    Caption {
        /// Path to a JPEG, PNG, WebP or GIF image
        file: PathBuf,
        /// Caption style: default, descriptive, creative, humorous, professional, social
        #[arg(long, default_value = "default")]
        style: CaptionStyle,
        /// Language code for the caption, e.g. "fr"
        #[arg(long)]
        language: Option<String>,
        /// Extra context for the model
        #[arg(long)]
        context: Option<String>,
        /// Ask for hashtags
        #[arg(long)]
        hashtags: bool,
        /// Allow emojis in the caption
        #[arg(long)]
        emojis: bool,
        /// Save the captioned image to history
        #[arg(long)]
        save: bool,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// List recently captioned images
    History {
        #[arg(long, default_value_t = HISTORY_LIMIT)]
        limit: usize,
        /// Print raw JSON records
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Derive hashtags from a caption
    Hashtags {
        caption: String,
        /// Ask the server instead of computing locally
        #[arg(long)]
        remote: bool,
        #[arg(long, env = "CAPTIONATOR_API_URL", default_value = DEFAULT_API_URL)]
        api_url: String,
    },
    /// Sign up, sign in or check a token against a running server
    Account {
        #[command(subcommand)]
        action: AccountAction,
        #[arg(long, env = "CAPTIONATOR_API_URL", default_value = DEFAULT_API_URL, global = true)]
        api_url: String,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Create an account and print its ID token
    Signup {
        email: String,
        #[arg(long, env = "CAPTIONATOR_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in with email and password and print the ID token
    Login {
        email: String,
        #[arg(long, env = "CAPTIONATOR_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Exchange a Google ID token for a session
    Google { id_token: String },
    /// Show the user an ID token belongs to
    Whoami {
        #[arg(long, env = "CAPTIONATOR_TOKEN", hide_env_values = true)]
        token: String,
    },
}

#[derive(Args)]
struct RemoteArgs {
    /// Server base URL
    #[arg(long, env = "CAPTIONATOR_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
    /// ID token sent as a bearer token
    #[arg(long, env = "CAPTIONATOR_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Sign in with this email before the request
    #[arg(long, requires = "password")]
    email: Option<String>,
    #[arg(long, env = "CAPTIONATOR_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl RemoteArgs {
    async fn client(&self) -> Result<ApiClient, anyhow::Error> {
        let client = ApiClient::new(&self.api_url)?;
        let (Some(email), Some(password)) = (&self.email, &self.password) else {
            return Ok(client.with_token(self.token.clone()));
        };

        let session = AuthSession::new(Arc::new(client.clone()));
        let user = session
            .login(email, password)
            .await
            .context("sign-in failed")?;
        info!(uid = %user.uid, "signed in");
        Ok(client.with_token(session.id_token()))
    }
}

/// Reports workflow notifications on the log; results go to stdout.
struct ConsoleObserver;

impl WorkflowObserver for ConsoleObserver {
    fn notify(&mut self, notification: &Notification) {
        match notification.level {
            NotificationLevel::Success => {
                info!(title = %notification.title, "{}", notification.message)
            }
            NotificationLevel::Error => {
                error!(title = %notification.title, "{}", notification.message)
            }
        }
    }
}

async fn serve() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let captioner = GeminiCaptionClient::new(&config.gemini_api_key, &config.gemini_model)?
        .with_base_url(&config.gemini_api_url);

    let history: Arc<dyn HistoryStore> = match &config.database {
        Some(db) => {
            let store = PlanetScaleHistoryStore::new(&db.host, &db.username, &db.password);
            store
                .ensure_schema()
                .await
                .context("failed to prepare images table")?;
            Arc::new(store)
        }
        None => {
            warn!("no database configured, history is kept in memory");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let identity = config.identity.as_ref().map(|identity| {
        let provider = FirebaseIdentityProvider::new(&identity.api_key);
        let provider = match &identity.base_url {
            Some(url) => provider.with_base_url(url),
            None => provider,
        };
        Arc::new(provider) as Arc<dyn IdentityProvider>
    });
    if identity.is_none() {
        info!("identity provider not configured, auth endpoints disabled");
    }

    let state = Arc::new(AppState {
        captioner: Arc::new(captioner),
        history,
        identity,
        require_auth: config.require_auth,
    });

    let router = build_router(
        state,
        config.whitelisted_hosts.clone(),
        config.rate_limit_burst,
    )?;
    info!(model = %config.gemini_model, require_auth = config.require_auth, "starting server");
    Booter::new(config.port).await?.start(router).await
}

async fn caption(
    file: PathBuf,
    params: CaptionParams,
    save: bool,
    remote: RemoteArgs,
) -> Result<(), anyhow::Error> {
    let client = Arc::new(remote.client().await?);
    let mut session =
        CaptionSession::new(client.clone(), ConsoleObserver).with_history(client.clone());

    let selected = SelectedFile::from_path(&file).await?;
    if !is_accepted_type(&selected.mime_type) {
        warn!(file = %file.display(), "not a JPEG, PNG, WebP or GIF file");
    }
    session.dispatch(Event::ParamsChanged(params));
    session.dispatch(Event::FileSelected(selected));
    session.settle().await;
    info!(
        mime = session.state().mime_type().unwrap_or("unknown"),
        encoded_len = session.state().preview().map_or(0, str::len),
        style = %session.state().params().style,
        "image loaded"
    );

    if session.state().phase() == Phase::Ready {
        session.dispatch(Event::GenerateRequested);
        session.settle().await;
    }

    if let Some(err) = session.state().error() {
        bail!("{}", err);
    }
    let Some(caption) = session.state().caption() else {
        bail!("no caption was produced");
    };
    println!("{}", caption);
    if let Some(hashtags) = session.state().hashtags() {
        println!("{}", hashtags.join(" "));
    }

    if save {
        session.dispatch(Event::SaveRequested);
        session.settle().await;
        match session.state().saved_id() {
            Some(id) => println!("saved: {}", id),
            None => bail!("failed to save image to history"),
        }
    }
    Ok(())
}

async fn history(limit: usize, json: bool, remote: RemoteArgs) -> Result<(), anyhow::Error> {
    let client = remote.client().await?;
    let records = client.list(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {:<12}  {}",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.style,
            record.caption.as_deref().unwrap_or("(no caption)")
        );
    }
    Ok(())
}

async fn account(action: AccountAction, api_url: String) -> Result<(), anyhow::Error> {
    let session = AuthSession::new(Arc::new(ApiClient::new(api_url)?));
    let mut signed_in = session.subscribe();

    let print_token = !matches!(action, AccountAction::Whoami { .. });
    let result = match action {
        AccountAction::Signup { email, password } => session.register(&email, &password).await,
        AccountAction::Login { email, password } => session.login(&email, &password).await,
        AccountAction::Google { id_token } => session.login_with_google(&id_token).await,
        AccountAction::Whoami { token } => session.resume(&token).await,
    };
    result.context("authentication failed")?;

    let Some(user) = session.current_user() else {
        bail!("no user is signed in");
    };
    println!(
        "{}  {}",
        user.uid,
        user.email.as_deref().unwrap_or("(no email)")
    );
    let token = signed_in
        .borrow_and_update()
        .as_ref()
        .map(|signed| signed.id_token.clone());
    if let (true, Some(token)) = (print_token, token) {
        println!("{}", token);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Caption {
            file,
            style,
            language,
            context,
            hashtags,
            emojis,
            save,
            remote,
        } => {
            let params = CaptionParams {
                style,
                language,
                context,
                include_hashtags: hashtags,
                include_emojis: emojis,
            };
            caption(file, params, save, remote).await
        }
        Commands::History {
            limit,
            json,
            remote,
        } => history(limit, json, remote).await,
        Commands::Hashtags {
            caption,
            remote,
            api_url,
        } => {
            let hashtags = if remote {
                ApiClient::new(api_url)?.hashtags(&caption).await?
            } else {
                generate_hashtags(&caption)
            };
            println!("{}", hashtags.join(" "));
            Ok(())
        }
        Commands::Account { action, api_url } => account(action, api_url).await,
    }
}
