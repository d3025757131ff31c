use anyhow::anyhow;
use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};
use const_format::concatcp;
use rand::{seq::SliceRandom, Rng};
use reqwest::{
    blocking::{Client, Response},
    StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs::File;
use std::ops::{AddAssign, Div};
use std::process::{self, Child, Command, Stdio};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

const LOCAL_PORT: u32 = 8374;
const LOCAL_URL: &str = concatcp!("http://127.0.0.1:", LOCAL_PORT);

#[rustfmt::skip]
const ROCKET_ENV: &[(&str, &str)] = &[
    ("ROCKET_PORT", concatcp!(LOCAL_PORT)),
    ("ROCKET_HOSTNAME", LOCAL_URL),
    ("ROCKET_JWT_SECRET", "dummy"),
    ("ROCKET_HMAC_SECRET", "dummy"),
];

const CANDIDATES: [&str; 2] = ["c1", "c2"];

const PASSWORD: &str = "benchmark-password";

#[derive(Parser)]
struct Args {
    /// Silence local server logging.
    #[arg(short, long)]
    quiet: bool,

    /// Send local server logging to this file; takes precedence over --quiet.
    #[arg(long)]
    logfile: Option<String>,

    /// Connect to a remote server at this URL instead of running a local one.
    #[arg(long)]
    remote: Option<String>,

    /// How many threads to use. Defaults to the number of logical CPUs.
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// How many voters each thread signs up.
    #[arg(long, default_value_t = 25)]
    voters_per_thread: usize,

    /// How many simultaneous vote attempts each voter makes.
    /// Exactly one of them must be accepted.
    #[arg(long, default_value_t = 3)]
    attempts: usize,

    /// Where voters' LinkedIn profiles come from.
    #[arg(long, value_enum, default_value_t)]
    linkedin_mode: LinkedinMode,
}

/// Where voters' LinkedIn profiles come from.
#[derive(Debug, Copy, Clone, ValueEnum)]
enum LinkedinMode {
    /// Stored on the profile at signup.
    Profile,
    /// Supplied with the vote, after the server asks for it.
    Inline,
    /// Pick one of the above with equal probability.
    Mixed,
}

impl LinkedinMode {
    /// Return `true` if the voter should store a profile URL at signup.
    fn stored_on_profile(&self) -> bool {
        match self {
            Self::Profile => true,
            Self::Inline => false,
            Self::Mixed => rand::random(),
        }
    }
}

impl Default for LinkedinMode {
    fn default() -> Self {
        Self::Mixed
    }
}

/// Construct a URL from segments.
macro_rules! url {
    ($($segment:expr),+) => {{
        std::path::PathBuf::from_iter([$($segment),+]).to_str().unwrap()
    }}
}

/// Build the server and set its environment.
fn setup_deps() -> anyhow::Result<()> {
    Command::new("cargo")
        .args(["build", "--release", "--bin", "teamvote-backend"])
        .status()?
        .success()
        .then_some(())
        .ok_or_else(|| anyhow!("server build exited nonzero"))?;

    // Votes are only safe against a replica set, so there is no default.
    if env::var("ROCKET_DB_URI").is_err() {
        return Err(anyhow!(
            "ROCKET_DB_URI must point at a MongoDB replica set to run locally"
        ));
    }

    for (var, val) in ROCKET_ENV {
        env::set_var(var, val);
    }

    Ok(())
}

/// Terminate the given child process. This is a SIGTERM on unix and a hard-kill on other
/// platforms.
fn terminate_child(child: &mut Child) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM)?;
    }
    #[cfg(not(unix))]
    {
        child.kill()?;
    }
    Ok(())
}

/// Start the local server and wait until it answers.
fn launch_server(logfile: Stdio) -> anyhow::Result<Child> {
    let mut proc = Command::new("./target/release/teamvote-backend")
        .stdout(logfile)
        .spawn()?;

    let client = Client::new();
    loop {
        let resp = client
            .get(url!(LOCAL_URL, "teams"))
            .send()
            .and_then(Response::error_for_status);
        if resp.is_ok() {
            break;
        }

        // Check the server didn't exit.
        if let Some(retcode) = proc.try_wait()? {
            return Err(anyhow!("Server exited prematurely with code {}", retcode));
        }
        thread::sleep(StdDuration::from_millis(100));
    }

    Ok(proc)
}

/// Sign up an organizer, create a team to benchmark against and return its slug.
fn setup_team(url: &str, run_id: u32) -> anyhow::Result<String> {
    let client = Client::builder().cookie_store(true).build()?;

    let organizer = json!({
        "name": "Benchmark Organizer",
        "email": format!("organizer-{run_id}@bench.example"),
        "password": PASSWORD,
        "linkedinUrl": "https://www.linkedin.com/in/benchmark-organizer",
    });
    client
        .post(url!(url, "auth/organizer/signup"))
        .json(&organizer)
        .send()
        .and_then(Response::error_for_status)?;

    let slug = format!("bench-{run_id}");
    let team = json!({
        "name": "Benchmark Team",
        "slug": slug,
        "description": "Vote storm",
        "deadline": Utc::now() + Duration::hours(2),
        "candidates": [
            { "id": CANDIDATES[0], "name": "Alice", "linkedinUrl": "https://www.linkedin.com/in/alice" },
            { "id": CANDIDATES[1], "name": "Bob", "linkedinUrl": "https://www.linkedin.com/in/bob" },
        ],
    });
    client
        .post(url!(url, "teams"))
        .json(&team)
        .send()
        .and_then(Response::error_for_status)?;

    Ok(slug)
}

/// Sign up a voter and return the client with embedded auth cookies.
fn voter_signup(
    url: &str,
    run_id: u32,
    voter_id: usize,
    linkedin_mode: LinkedinMode,
) -> anyhow::Result<(Client, StdDuration)> {
    let client = Client::builder().cookie_store(true).build()?;
    let start = Instant::now();

    let mut data = json!({
        "name": format!("Voter {voter_id}"),
        "email": format!("voter-{run_id}-{voter_id}@bench.example"),
        "password": PASSWORD,
    });
    if linkedin_mode.stored_on_profile() {
        data["linkedinUrl"] = json!(format!("https://www.linkedin.com/in/voter-{voter_id}"));
    }
    client
        .post(url!(url, "auth/signup"))
        .json(&data)
        .send()
        .and_then(Response::error_for_status)?;

    Ok((client, start.elapsed()))
}

/// What each of a voter's simultaneous attempts came to.
#[derive(Debug, Default)]
struct Outcomes {
    accepted: usize,
    already_voted: usize,
    linkedin_required: usize,
}

impl AddAssign for Outcomes {
    fn add_assign(&mut self, rhs: Self) {
        self.accepted += rhs.accepted;
        self.already_voted += rhs.already_voted;
        self.linkedin_required += rhs.linkedin_required;
    }
}

/// Durations of each part of the voting process.
#[derive(Debug, Default)]
struct VoteTimings {
    auth: StdDuration,
    vote: StdDuration,
}

impl AddAssign for VoteTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.auth += rhs.auth;
        self.vote += rhs.vote;
    }
}

impl Div<u32> for VoteTimings {
    type Output = Self;

    fn div(self, rhs: u32) -> Self {
        Self {
            auth: self.auth / rhs,
            vote: self.vote / rhs,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteBody {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    require_linkedin: bool,
}

/// Fire `attempts` identical votes at once from one pre-authenticated
/// `client`, resubmitting with a LinkedIn URL when asked to.
fn vote_storm(
    url: &str,
    slug: &str,
    voter_id: usize,
    client: &Client,
    attempts: usize,
) -> anyhow::Result<Outcomes> {
    let candidate = CANDIDATES.choose(&mut rand::thread_rng()).copied();
    let ballot = json!({ "teamSlug": slug, "candidateId": candidate });
    let barrier = Barrier::new(attempts);

    let results = thread::scope(|s| {
        let handles = (0..attempts)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    let mut ballot = ballot.clone();
                    let mut outcomes = Outcomes::default();
                    loop {
                        let resp = client.post(url!(url, "vote")).json(&ballot).send()?;
                        match resp.status() {
                            StatusCode::OK => {
                                let body: VoteBody = resp.json()?;
                                if body.ok {
                                    outcomes.accepted += 1;
                                    break;
                                }
                                if body.require_linkedin && ballot.get("linkedinUrl").is_none() {
                                    outcomes.linkedin_required += 1;
                                    ballot["linkedinUrl"] = json!(format!(
                                        "https://www.linkedin.com/in/inline-voter-{voter_id}"
                                    ));
                                    continue;
                                }
                                return Err(anyhow!("Unexpected vote response"));
                            }
                            StatusCode::CONFLICT => {
                                outcomes.already_voted += 1;
                                break;
                            }
                            status => return Err(anyhow!("Vote failed with {status}")),
                        }
                    }
                    Ok::<_, anyhow::Error>(outcomes)
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect::<Vec<_>>()
    });

    let mut total = Outcomes::default();
    for result in results {
        total += result?;
    }
    if total.accepted != 1 {
        return Err(anyhow!(
            "voter {voter_id} had {} votes accepted out of {attempts} attempts",
            total.accepted
        ));
    }
    Ok(total)
}

/// Run the benchmark, returning how many voters took part.
fn benchmark(url: &str, slug: &str, run_id: u32, args: &Args) -> anyhow::Result<usize> {
    let per_thread = args.voters_per_thread;
    let end_val: usize = args.threads * per_thread;

    let start = Instant::now();
    thread::scope(|s| {
        let mut threads = Vec::with_capacity(args.threads);

        for first in (0..end_val).step_by(per_thread) {
            let t = s.spawn(move || {
                let mut timings = VoteTimings::default();
                let mut outcomes = Outcomes::default();

                for voter_id in first..(first + per_thread) {
                    let (client, auth_dur) =
                        voter_signup(url, run_id, voter_id, args.linkedin_mode)?;
                    let pre_vote = Instant::now();
                    outcomes += vote_storm(url, slug, voter_id, &client, args.attempts)?;

                    timings += VoteTimings {
                        auth: auth_dur,
                        vote: pre_vote.elapsed(),
                    };
                }

                Ok::<_, anyhow::Error>((timings / per_thread as u32, outcomes))
            });
            threads.push(t);
        }

        let mut timings = VoteTimings::default();
        let mut outcomes = Outcomes::default();
        for t in threads {
            let (thread_timings, thread_outcomes) = t.join().expect("thread panicked")?;
            timings += thread_timings;
            outcomes += thread_outcomes;
        }
        let total_duration = start.elapsed();

        let avg = timings / args.threads as u32;
        let voters_per_sec = end_val as f64 / total_duration.as_secs_f64();

        println!("auth: {:?}", avg.auth);
        println!("vote: {:?}", avg.vote);
        println!(
            "\noutcomes: {} accepted, {} refused as duplicates, {} asked for LinkedIn",
            outcomes.accepted, outcomes.already_voted, outcomes.linkedin_required
        );
        println!(
            "actual duration: {} voters in {:?} ({:.2}/s)",
            end_val, total_duration, voters_per_sec
        );

        Ok(end_val)
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Voter {
    voter_name: String,
    candidate_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VotersSummary {
    voters: Vec<Voter>,
    vote_counts: BTreeMap<String, u64>,
    total_votes: u64,
}

/// Return `Ok(())` if the ledger holds exactly one vote per voter and the
/// tally agrees with it.
fn verify(url: &str, slug: &str, expected: usize) -> anyhow::Result<()> {
    let summary: VotersSummary = Client::new()
        .get(url!(url, "teams", slug, "voters"))
        .send()
        .and_then(Response::error_for_status)?
        .json()?;

    if summary.voters.len() != expected {
        return Err(anyhow!(
            "expected {expected} votes, ledger has {}",
            summary.voters.len()
        ));
    }
    let names = summary
        .voters
        .iter()
        .map(|voter| voter.voter_name.as_str())
        .collect::<HashSet<_>>();
    if names.len() != expected {
        return Err(anyhow!("some voter appears more than once"));
    }
    if summary.total_votes != expected as u64
        || summary.vote_counts.values().sum::<u64>() != summary.total_votes
    {
        return Err(anyhow!("tally disagrees with the ledger"));
    }
    for candidate in CANDIDATES {
        let listed = summary
            .voters
            .iter()
            .filter(|voter| voter.candidate_id == candidate)
            .count() as u64;
        let counted = summary.vote_counts.get(candidate).copied().unwrap_or(0);
        if listed != counted {
            return Err(anyhow!(
                "candidate {candidate}: {listed} votes listed but {counted} counted"
            ));
        }
    }

    println!("verified: {expected} voters, one vote each, tally consistent");
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let url = args.remote.as_deref().unwrap_or(LOCAL_URL);
    if args.threads == 0 || args.voters_per_thread == 0 || args.attempts == 0 {
        return Err(anyhow!("threads, voters and attempts must all be positive"));
    }

    // If we're not connecting remotely, bring up a local server.
    let mut proc: Option<Child> = None;
    if args.remote.is_none() {
        setup_deps()?;
        let logfile = match &args.logfile {
            Some(path) => Stdio::from(File::create(path)?),
            None => {
                if args.quiet {
                    Stdio::null()
                } else {
                    Stdio::inherit()
                }
            }
        };
        proc = Some(launch_server(logfile)?);
    }

    // Use a closure to ensure the cleanup below runs.
    let result = (|| {
        let run_id: u32 = rand::thread_rng().gen();
        let slug = setup_team(url, run_id)?;
        let voters = benchmark(url, &slug, run_id, &args)?;
        verify(url, &slug, voters)
    })();

    // Kill the server.
    if let Some(p) = proc.as_mut() {
        terminate_child(p)?;
        p.wait()?;
    }

    result
}

fn main() {
    if let Err(e) = run() {
        eprintln!("FATAL: {}", e);
        process::exit(1);
    }
}
