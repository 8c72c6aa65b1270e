use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "upmerge",
    version,
    about = "Maintain local overrides to /etc",
    long_about = "`upmerge` applies a tree of local override files on top of a system configuration
directory, typically after an OS upgrade has reset it.

Every file under the source directory is compared with the file at the same relative path under
the destination directory:
    - missing in the destination: it is copied
    - identical: nothing happens
    - different: the destination is moved to `<file>.upmerge~` and the override copied in its place

A backup is only replaced when it holds exactly what the destination holds. Otherwise upmerge
refuses and stops, so a backup you have not reviewed yet is never lost. Source files ending in
`~` are ignored. Nothing is ever deleted.

Do not run two instances against the same destination at the same time.

EXIT CODES:
    0 - Success
    1 - Usage error
    2 - Errors occurred, including a refusal to overwrite a backup

EXAMPLES:
    # Show what would change
    upmerge -n -v

    # Apply overrides from a custom location
    sudo upmerge -v -s /srv/overrides/etc -d /etc"
)]
struct Args {
    // Reconcile options
    /// Dry run (don't try making any changes)
    ///
    /// Every decision is taken and reported as usual, combine with -v to see them.
    #[arg(short = 'n', long = "dry-run", help_heading = "Reconcile options")]
    dry_run: bool,

    /// Use DIR as the source
    #[arg(
        short = 's',
        long = "src",
        value_name = "DIR",
        default_value = common::DEFAULT_SRC,
        help_heading = "Reconcile options"
    )]
    src: std::path::PathBuf,

    /// Use DIR as the destination
    #[arg(
        short = 'd',
        long = "dest",
        value_name = "DIR",
        default_value = common::DEFAULT_DST,
        help_heading = "Reconcile options"
    )]
    dest: std::path::PathBuf,

    // Progress & output
    /// Be verbose: -v lists every action / -vv DEBUG / -vvv TRACE (default: errors only)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,
}

async fn async_main(settings: common::Settings) -> Result<common::Summary, common::Error> {
    common::reconcile(&settings, &common::LogObserver).await
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            // help and version go to stdout and are not failures
            let code = if error.use_stderr() { 1 } else { 0 };
            if let Err(print_error) = error.print() {
                eprintln!("{error}");
                eprintln!("upmerge: failed writing usage: {print_error}");
            }
            std::process::exit(code);
        }
    };
    let settings = common::Settings {
        src: args.src,
        dst: args.dest,
        dry_run: args.dry_run,
    };
    let output = common::OutputConfig {
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let func = || async_main(settings);
    if common::run(&output, func).is_none() {
        std::process::exit(2);
    }
}
