// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tokio::runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

use domaind::client::Client;
use domaind::config::{self, Config};
use domaind::daemon::Daemon;
use domaind::fork::Invocation;
use domaind::msg::{Request, Response};
use domaind::signal::SignalKind;
use domaind::{Domain, Error};

const DAEMON: &str = "daemon";
const START: &str = "start";
const RUN: &str = "run";
const STOP: &str = "stop";
const LIST: &str = "list";
const STOP_ALL: &str = "stop-all";
const SHUTDOWN: &str = "shutdown";

const DOMAIN: &str = "DOMAIN";
const COMMAND: &str = "COMMAND";
const SHELL: &str = "shell";
const CHECK_SERVER: &str = "check-server";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
    fn domain_arg(self) -> Self;
    fn command_args(self) -> Self;
    fn signal_opt(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }

    fn domain_arg(self) -> Self {
        self.arg(
            Arg::with_name(DOMAIN)
                .required(true)
                .validator(|i| {
                    i.parse::<Domain>()
                        .map(|_| ())
                        .map_err(|_| String::from("domain id must be a non-negative number"))
                })
                .help("domain id of the discovery server"),
        )
    }

    fn command_args(self) -> Self {
        self.setting(AppSettings::TrailingVarArg)
            .arg(
                Arg::with_name(SHELL)
                    .long(SHELL)
                    .help("run COMMAND as a single line with `sh -c`"),
            )
            .arg(
                Arg::with_name(COMMAND)
                    .required(true)
                    .multiple(true)
                    .help("program and arguments to execute"),
            )
    }

    fn signal_opt(self) -> Self {
        self.arg(
            Arg::with_name(config::SIGNAL)
                .short("s")
                .long(config::SIGNAL)
                .value_name("SIGNAL")
                .default_value("term")
                .validator(|s| s.parse::<SignalKind>().map(|_| ()).map_err(|e| e.to_string()))
                .help("0|int, 1|term or 2|kill, delivered to the server's process group")
                .takes_value(true),
        )
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name(config::SOCKET)
                .long(config::SOCKET)
                .value_name("PATH")
                .env(config::SOCKET_ENV)
                .help("control socket of the daemon")
                .takes_value(true),
        )
        .subcommand(
            SubCommand::with_name(DAEMON)
                .setup_clap_app()
                .about("run the supervisor, serving requests on the control socket"),
        )
        .subcommand(
            SubCommand::with_name(START)
                .setup_clap_app()
                .about("start the discovery server for a domain")
                .domain_arg()
                .command_args(),
        )
        .subcommand(
            SubCommand::with_name(RUN)
                .setup_clap_app()
                .about("run a command against a domain's server and print its output")
                .arg(
                    Arg::with_name(CHECK_SERVER)
                        .long(CHECK_SERVER)
                        .help("only run if the domain's server is running"),
                )
                .domain_arg()
                .command_args(),
        )
        .subcommand(
            SubCommand::with_name(STOP)
                .setup_clap_app()
                .about("stop the discovery server for a domain")
                .domain_arg()
                .signal_opt(),
        )
        .subcommand(
            SubCommand::with_name(LIST)
                .setup_clap_app()
                .about("list running servers by domain"),
        )
        .subcommand(
            SubCommand::with_name(STOP_ALL)
                .setup_clap_app()
                .about("stop every running server")
                .signal_opt(),
        )
        .subcommand(
            SubCommand::with_name(SHUTDOWN)
                .setup_clap_app()
                .about("stop every running server and exit the daemon"),
        )
        .get_matches();

    let config = Config::from_args(&args)?;

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(dispatch(&args, &config))
}

async fn dispatch(args: &ArgMatches<'_>, config: &Config) -> Result<(), Error> {
    match args.subcommand() {
        (DAEMON, Some(_)) => daemon(config).await,
        (START, Some(args)) => {
            let request = Request::Start {
                domain: domain(args)?,
                invocation: invocation(args)?,
            };
            send(config, &request).await
        }
        (RUN, Some(args)) => {
            let request = Request::Run {
                domain: domain(args)?,
                invocation: invocation(args)?,
                check_server: args.is_present(CHECK_SERVER),
            };
            send(config, &request).await
        }
        (STOP, Some(args)) => {
            let request = Request::Stop {
                domain: domain(args)?,
                signal: config.signal,
            };
            send(config, &request).await
        }
        (LIST, Some(_)) => send(config, &Request::List).await,
        (STOP_ALL, Some(_)) => {
            let request = Request::StopAll {
                signal: config.signal,
            };
            send(config, &request).await
        }
        (SHUTDOWN, Some(_)) => send(config, &Request::Shutdown).await,
        (arg, _) => {
            println!("unexpected argument: {}", arg);
            println!("{}", args.usage());
            std::process::exit(2);
        }
    }
}

async fn daemon(config: &Config) -> Result<(), Error> {
    let daemon = Daemon::bind(&config.socket).await?;
    info!("{} started", env!("CARGO_PKG_NAME"));

    daemon.run().await.map(drop)
}

async fn send(config: &Config, request: &Request) -> Result<(), Error> {
    let mut client = Client::connect(&config.socket).await?;

    match client.request(request).await? {
        Response::Message(message) => {
            print!("{}", message);
            if !message.is_empty() && !message.ends_with('\n') {
                println!();
            }
        }
        Response::Processes(processes) => {
            for (domain, pid) in processes {
                println!("{}\t{}", domain, pid);
            }
        }
        Response::Error(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn domain(args: &ArgMatches<'_>) -> Result<Domain, Error> {
    args.value_of(DOMAIN)
        .ok_or("DOMAIN is required")?
        .parse::<Domain>()
        .map_err(|e| Error::from(format!("bad domain id: {}", e)))
}

fn invocation(args: &ArgMatches<'_>) -> Result<Invocation, Error> {
    let argv: Vec<String> = args
        .values_of(COMMAND)
        .ok_or("COMMAND is required")?
        .map(String::from)
        .collect();

    if args.is_present(SHELL) {
        Ok(Invocation::shell(argv.join(" ")))
    } else {
        Invocation::new(argv)
    }
}
