use std::env;
use std::env::current_dir;
use std::path::PathBuf;

use anyhow::{Context, Error};
use clap::Parser;
use console::Term;

use crate::danbooru::DanbooruWebConnector;
use crate::danbooru::grabber::{Grabber, Rating, SearchQuery};
use crate::danbooru::io::directory::scan_latest_id;
use crate::danbooru::sender::RequestSender;
use crate::danbooru::session::Session;
use crate::danbooru::styled_tag;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Address of the live imageboard.
const DANBOORU_URL: &str = "https://danbooru.donmai.us";

/// Address of the sandbox instance meant for experiments.
const TESTBOORU_URL: &str = "https://testbooru.donmai.us";

/// Environment variable consulted when `--username` is absent.
const USERNAME_VAR: &str = "DANBOORU_USERNAME";

/// Environment variable consulted when `--api-key` is absent.
const API_KEY_VAR: &str = "DANBOORU_API_KEY";

/// Command line surface of the downloader.
#[derive(Parser, Debug)]
#[command(version, about = "Bulk downloads every post matching a tag from a Danbooru style imageboard")]
pub(crate) struct Args {
    /// Tag to search for.
    #[arg(long)]
    tag: String,

    /// Maximum number of posts to grab; grabs every match when absent.
    #[arg(long)]
    limit: Option<u64>,

    /// Restrict the search to posts with this rating.
    #[arg(long, value_enum)]
    rating: Option<Rating>,

    /// Save only the tag list and record artifacts, never the image.
    #[arg(long)]
    metadata_only: bool,

    /// Search from the beginning instead of resuming past the local mirror.
    #[arg(long)]
    ignore_existing: bool,

    /// Talk to the testbooru sandbox instead of the live site.
    #[arg(long)]
    test: bool,

    /// Root directory the mirror is written under.
    #[arg(long, default_value = "images")]
    output: PathBuf,

    /// Login name; falls back to the DANBOORU_USERNAME variable.
    #[arg(long)]
    username: Option<String>,

    /// API key; falls back to the DANBOORU_API_KEY variable.
    #[arg(long)]
    api_key: Option<String>,
}

impl Args {
    /// Login taken from the flags first and the environment second.
    fn credentials(&self) -> Result<(String, String), Error> {
        let username = self
            .username
            .clone()
            .or_else(|| env::var(USERNAME_VAR).ok())
            .with_context(|| format!("No username given: pass --username or set {USERNAME_VAR}"))?;
        let api_key = self
            .api_key
            .clone()
            .or_else(|| env::var(API_KEY_VAR).ok())
            .with_context(|| format!("No API key given: pass --api-key or set {API_KEY_VAR}"))?;
        Ok((username, api_key))
    }

    fn base_url(&self) -> &'static str {
        if self.test { TESTBOORU_URL } else { DANBOORU_URL }
    }
}

/// A program class that handles the flow of the downloader and its steps of execution.
pub(crate) struct Program;

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Self
    }

    /// Runs the downloader program.
    pub(crate) fn run(&self) -> Result<(), Error> {
        let args = Args::parse();
        Term::stdout().set_title("danbooru downloader");
        trace!("Starting danbooru downloader...");
        trace!("Program Name:    {NAME}");
        trace!("Program Version: {VERSION}");
        let working_directory = current_dir().context("Unable to get the working directory")?;
        trace!("Program Working Directory: {}", working_directory.display());

        let (username, api_key) = args.credentials()?;
        trace!("Login Username: {username}");
        trace!("Login API Key:  {}", "*".repeat(api_key.len()));

        let request_sender = RequestSender::new(args.base_url())?;
        trace!("Remote: {}", request_sender.base_url());
        Session::new(username, api_key).validate(&request_sender)?;
        info!("Credentials accepted.");

        // Resume where the mirror stops unless told to re-list everything.
        let id_above = if args.ignore_existing {
            0
        } else {
            scan_latest_id(&args.output, &args.tag)
        };
        if id_above > 0 {
            info!("Resuming {} past post {id_above}.", styled_tag(&args.tag));
        }

        let query = SearchQuery::new(args.tag.clone(), args.rating, args.limit, id_above);
        let grabber = Grabber::new(request_sender.clone());
        let posts = grabber.grab_posts(&query)?;

        let mut connector = DanbooruWebConnector::new(&request_sender, args.output.clone());
        connector.download_posts(posts, &args.tag, args.metadata_only)?;

        info!("Finished downloading posts!");
        Ok(())
    }
}
