use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, error::ErrorKind};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use zrecsync::{
   Result,
   cmd::{self, sync::OutputOptions},
   config,
   engine::SyncOptions,
   record::CompareMode,
   zfs::ZfsCli,
};

/// Command-line arguments for zrecsync
#[derive(Parser)]
#[command(name = "zrecsync")]
#[command(about = "Copy only the ZFS records that differ between two files")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
   #[arg(short, long, action = ArgAction::Count, global = true, help = "More logging (repeatable)")]
   verbose: u8,

   #[arg(short, long, global = true, conflicts_with = "verbose", help = "Only log errors")]
   quiet: bool,

   #[command(subcommand)]
   command: Option<Cmd>,

   #[command(flatten)]
   sync: SyncArgs,
}

#[derive(Args)]
struct SyncArgs {
   #[arg(help = "Source file")]
   srcfile: Option<PathBuf>,

   #[arg(help = "Destination file (created if missing)")]
   dstfile: Option<PathBuf>,

   #[arg(short = 'n', long, help = "Scan and compare only; leave the destination untouched")]
   dry_run: bool,

   #[arg(short, long, help = "Compare records by block address or by checksum")]
   mode: Option<CompareMode>,

   #[arg(short, long, conflicts_with = "mode", help = "Compare by checksum (same as --mode hash)")]
   checksum: bool,

   #[arg(short, long, help = "Read the destination first and skip identical records")]
   optimize: bool,

   #[arg(long, help = "Do not fsync the destination after writing")]
   no_fsync: bool,

   #[arg(long, help = "Do not flush pending transaction groups before scanning")]
   no_flush: bool,

   #[arg(long, help = "JSON output")]
   json: bool,

   #[arg(long, help = "Hide the progress bar")]
   no_progress: bool,
}

/// Available subcommands for zrecsync
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Print the record map of a file")]
   Scan {
      #[arg(help = "File to scan")]
      file: PathBuf,

      #[arg(short, long, help = "Token kind to extract: address or hash")]
      mode: Option<CompareMode>,

      #[arg(short, long, conflicts_with = "mode", help = "Extract checksums")]
      checksum: bool,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Check that the ZFS tools are available")]
   Doctor,
}

fn log_level(verbose: u8, quiet: bool) -> Level {
   if quiet {
      return Level::ERROR;
   }
   match verbose {
      0 => Level::WARN,
      1 => Level::INFO,
      2 => Level::DEBUG,
      _ => Level::TRACE,
   }
}

fn resolve_mode(mode: Option<CompareMode>, checksum: bool) -> CompareMode {
   if checksum {
      CompareMode::Hash
   } else {
      mode.unwrap_or(config::get().mode)
   }
}

#[tokio::main]
async fn main() {
   let cli = Cli::parse();

   tracing_subscriber::fmt()
      .with_writer(std::io::stderr)
      .with_env_filter(
         EnvFilter::from_default_env().add_directive(log_level(cli.verbose, cli.quiet).into()),
      )
      .init();

   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   let cfg = config::get();

   match cli.command {
      Some(Cmd::Scan { file, mode, checksum, json }) => {
         cmd::scan::execute(ZfsCli::from_config(cfg), file, resolve_mode(mode, checksum), json).await
      },
      Some(Cmd::Doctor) => cmd::doctor::execute().await,
      None => {
         let args = cli.sync;
         let (Some(src), Some(dst)) = (args.srcfile, args.dstfile) else {
            Cli::command()
               .error(ErrorKind::MissingRequiredArgument, "both <SRCFILE> and <DSTFILE> are required")
               .exit();
         };

         let options = SyncOptions {
            mode:              resolve_mode(args.mode, args.checksum),
            dry_run:           args.dry_run,
            optimize:          args.optimize || cfg.optimize,
            fsync:             cfg.fsync && !args.no_fsync,
            flush_before_scan: cfg.flush_before_scan && !args.no_flush,
         };
         let output = OutputOptions { json: args.json, progress: cfg.progress && !args.no_progress };

         cmd::sync::execute(ZfsCli::from_config(cfg), src, dst, options, output).await
      },
   }
}
