mod app;
mod attachment;
mod auth;
mod completion;
mod config;
mod conversation;
mod exchange;
mod output;
mod profile;
mod storage;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dialoguer::{Input, Password};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::attachment::PathSource;
use crate::completion::OpenAiClient;
use crate::config::Config;
use crate::output::{DoctorOutput, JsonFormat};
use crate::profile::ProfilePatch;
use crate::storage::FileStore;

#[derive(Parser)]
#[command(
    name = "chatpad",
    version,
    about = "Chat with a completion model from the terminal",
    after_help = "Examples:\n  chatpad login --email test@example.com\n  chatpad chat\n  chatpad ask --text \"hello\"\n  chatpad ask --attach ./photo.jpg --text \"what is this?\"\n  chatpad profile edit --name \"Ada\" --bio \"math\"\n  chatpad profile avatar ./me.jpg\n  chatpad doctor --json"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, help = "Output JSON instead of text")]
    json: bool,

    #[arg(long, global = true, help = "Single-line JSON output")]
    compact: bool,

    #[arg(short, long, global = true, help = "Log debug output to stderr")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Log in with email and password")]
    Login(LoginArgs),
    #[command(about = "Clear the saved session")]
    Logout,
    #[command(about = "Show or edit your profile")]
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    #[command(about = "Interactive chat session")]
    Chat,
    #[command(about = "Send one message and print the reply")]
    Ask(AskArgs),
    #[command(about = "Print resolved configuration and session status")]
    Doctor,
}

#[derive(Args)]
struct LoginArgs {
    #[arg(long, help = "Account email")]
    email: Option<String>,

    #[arg(long, help = "Account password (prompted when omitted)")]
    password: Option<String>,
}

#[derive(Subcommand)]
enum ProfileCommand {
    #[command(about = "Print the current profile")]
    Show,
    #[command(about = "Change name, bio or phone (prompts when no flags are given)")]
    Edit(ProfileEditArgs),
    #[command(about = "Set the avatar from an image file")]
    Avatar(ProfileAvatarArgs),
}

#[derive(Args)]
struct ProfileEditArgs {
    #[arg(long, help = "Display name")]
    name: Option<String>,

    #[arg(long, help = "Short bio (empty clears it)")]
    bio: Option<String>,

    #[arg(long, help = "Phone number (empty clears it)")]
    phone: Option<String>,
}

#[derive(Args)]
struct ProfileAvatarArgs {
    #[arg(value_name = "PATH", help = "Image file (prompted when omitted)")]
    path: Option<PathBuf>,
}

#[derive(Args)]
struct AskArgs {
    #[arg(long, help = "Message text")]
    text: Option<String>,

    #[arg(long, value_name = "PATH", help = "Image, PDF or Word document to attach")]
    attach: Option<PathBuf>,

    #[arg(long, help = "Read message text from stdin")]
    stdin: bool,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load()?;
    debug!(api_url = %config.api_url, model = %config.model, "configuration loaded");
    let store = Arc::new(FileStore::new(config.state_path.clone()));
    let client = Arc::new(OpenAiClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
    ));
    let mut app = App::open(store, client).await;
    let json_format = output::resolve_json_format(cli.compact);

    match cli.command {
        Command::Login(args) => handle_login(args, &mut app).await?,
        Command::Logout => {
            app.auth.logout().await;
            println!("Logged out.");
        }
        Command::Profile { command } => {
            app.require_session()?;
            match command {
                ProfileCommand::Show => {
                    output::print_profile(app.profile.profile(), cli.json, json_format)?;
                }
                ProfileCommand::Edit(args) => {
                    let patch = profile_patch_from_args(args, &app)?;
                    let profile = app.profile.update(patch).await?;
                    output::print_profile(profile, cli.json, json_format)?;
                }
                ProfileCommand::Avatar(args) => {
                    let picker = attachment::AttachmentPicker::new(PathSource::new(args.path));
                    match picker.pick_image().await? {
                        Some(image) => {
                            let profile = app.profile.set_avatar(&image.uri).await?;
                            output::print_profile(profile, cli.json, json_format)?;
                        }
                        None => println!("Avatar unchanged."),
                    }
                }
            }
        }
        Command::Chat => {
            app.require_session()?;
            if !config.has_api_key() {
                eprintln!("Warning: no API key configured (set CHATPAD_API_KEY or OPENAI_API_KEY).");
            }
            run_chat(&mut app).await?;
        }
        Command::Ask(args) => {
            app.require_session()?;
            handle_ask(args, &mut app, cli.json, json_format).await?;
        }
        Command::Doctor => {
            let doctor = DoctorOutput {
                cfg: &config,
                api_key_configured: config.has_api_key(),
                authenticated: app.auth.is_authenticated(),
            };
            output::print_doctor(&doctor, cli.json, json_format)?;
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "warn,chatpad=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn handle_login(args: LoginArgs, app: &mut App) -> Result<(), Box<dyn std::error::Error>> {
    let email = match args.email {
        Some(email) => email,
        None => Input::new().with_prompt("Email").interact_text()?,
    };
    let password = match args.password {
        Some(password) => password,
        None => Password::new().with_prompt("Password").interact()?,
    };

    if !app.auth.login(&email, &password).await? {
        return Err("Invalid credentials".into());
    }
    println!("Logged in as {}.", app.profile.profile().name);
    Ok(())
}

fn profile_patch_from_args(args: ProfileEditArgs, app: &App) -> Result<ProfilePatch, Box<dyn std::error::Error>> {
    let patch = ProfilePatch {
        name: args.name.map(|name| name.trim().to_string()),
        bio: args.bio,
        phone: args.phone,
        avatar: None,
    };
    if !patch.is_empty() {
        if patch.name.as_deref().is_some_and(str::is_empty) {
            return Err("name cannot be empty".into());
        }
        return Ok(patch);
    }

    let current = app.profile.profile();
    let name: String = Input::new()
        .with_prompt("Name")
        .with_initial_text(current.name.clone())
        .interact_text()?;
    let bio: String = Input::new()
        .with_prompt("Bio")
        .with_initial_text(current.bio.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;
    let phone: String = Input::new()
        .with_prompt("Phone")
        .with_initial_text(current.phone.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    Ok(ProfilePatch {
        name: Some(name.trim().to_string()),
        bio: Some(bio),
        phone: Some(phone),
        avatar: None,
    })
}

fn resolve_message_text(text: Option<String>, stdin: bool) -> Result<String, Box<dyn std::error::Error>> {
    if stdin {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer.trim().to_string());
    }
    Ok(text.map(|text| text.trim().to_string()).unwrap_or_default())
}

async fn handle_ask(
    args: AskArgs,
    app: &mut App,
    json: bool,
    json_format: JsonFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = resolve_message_text(args.text, args.stdin)?;
    if let Some(path) = args.attach {
        let document = !is_image_path(&path);
        if !app.attach(PathSource::new(Some(path)), document).await? {
            return Err("attachment was not picked".into());
        }
    }
    if !app.ask(&text).await {
        return Err("message text is empty".into());
    }

    if json {
        output::print_transcript(app.exchange.messages(), true, json_format)?;
    } else if let Some(reply) = app.exchange.messages().last() {
        println!("{}", reply.text);
    }
    Ok(())
}

fn is_image_path(path: &std::path::Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .is_some_and(|mime| mime.type_().as_str() == "image")
}

const CHAT_HELP: &str = "Commands:\n  /image [PATH]  attach an image\n  /doc [PATH]    attach a PDF or Word document\n  /drop          remove the staged attachment\n  /history       reprint the conversation\n  /clear         start over\n  /quit          leave";

async fn run_chat(app: &mut App) -> Result<(), Box<dyn std::error::Error>> {
    println!("Chatting as {}. Type /help for commands.", app.profile.profile().name);
    loop {
        let prompt = match app.exchange.staged() {
            Some(attachment) => format!("you {}", output::attachment_line(attachment)),
            None => "you".to_string(),
        };
        let line: String = Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        let trimmed = line.trim();

        if let Some(command) = trimmed.strip_prefix('/') {
            let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
            let path = Some(rest.trim()).filter(|rest| !rest.is_empty()).map(PathBuf::from);
            match name {
                "quit" | "exit" => break,
                "help" => println!("{CHAT_HELP}"),
                "image" | "doc" => {
                    let document = name == "doc";
                    match app.attach(PathSource::new(path), document).await {
                        Ok(true) => {
                            if let Some(attachment) = app.exchange.staged() {
                                println!("Attached {}", output::attachment_line(attachment));
                            }
                        }
                        Ok(false) => println!("No file selected."),
                        Err(error) => println!("! {error}"),
                    }
                }
                "drop" => match app.exchange.unstage() {
                    Some(attachment) => println!("Removed {}", attachment.display_name),
                    None => println!("Nothing attached."),
                },
                "history" => {
                    if app.exchange.messages().is_empty() {
                        println!("No messages yet.");
                    }
                    for message in app.exchange.messages() {
                        output::print_message(message);
                    }
                }
                "clear" => {
                    app.exchange.clear();
                    println!("Conversation cleared.");
                }
                _ => println!("Unknown command /{name}. Type /help for commands."),
            }
            continue;
        }

        app.exchange.set_draft(line);
        let sent = app
            .send_draft(|messages| {
                if let Some(placeholder) = messages.last() {
                    output::print_message(placeholder);
                }
            })
            .await;
        if sent {
            if let Some(reply) = app.exchange.messages().last() {
                output::print_message(reply);
            }
        }
    }
    Ok(())
}
