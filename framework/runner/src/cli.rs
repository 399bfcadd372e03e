use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct CrosswindScenarioCli {
    /// The base URL of the API under test
    #[clap(long, env = "BASE_URL", default_value = "http://localhost:4000")]
    pub base_url: String,

    /// The username that VUs log in with. A random one is registered when this is not set.
    #[clap(long, env = "USERNAME")]
    pub username: Option<String>,

    /// The password that VUs log in with
    #[clap(long, env = "PASSWORD")]
    pub password: Option<String>,

    /// The directory that `summary.txt` and `summary.html` are written to
    #[clap(long, env = "OUT_DIR", default_value = ".")]
    pub out_dir: PathBuf,

    /// Stop the scenario after this many iterations have started, overriding the scenario's own
    /// limit.
    #[clap(long)]
    pub iterations: Option<u64>,

    /// The timeout for a single HTTP request, in seconds
    #[clap(long, default_value = "60")]
    pub request_timeout: u64,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// The run ID to use for this run. One is generated when this is not set.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Append the run summary, as a JSON line, to this file
    #[clap(long)]
    pub run_summary_path: Option<PathBuf>,
}

impl Default for CrosswindScenarioCli {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            username: None,
            password: None,
            out_dir: PathBuf::from("."),
            iterations: None,
            request_timeout: 60,
            no_progress: false,
            run_id: None,
            run_summary_path: None,
        }
    }
}
