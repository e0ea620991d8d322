/// Command-line options for the server binary.
///
/// Recognized flags:
/// - `-c PATH` / `--config-path PATH` / `--config-path=PATH`
/// - `-h` / `--help`
///
/// Anything else is ignored; when a flag repeats, the last occurrence wins.
pub struct CliArgs {
    pub config_path: Option<String>,
    pub help_requested: bool,
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut config_path = None;
        let mut help_requested = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => help_requested = true,
                "-c" | "--config-path" => {
                    if let Some(path) = args.next() {
                        config_path = Some(path);
                    }
                }
                other => {
                    if let Some(path) = other.strip_prefix("--config-path=") {
                        config_path = Some(path.to_string());
                    }
                }
            }
        }

        Self {
            config_path,
            help_requested,
        }
    }

    pub fn print_help() {
        eprintln!(
            "Usage: conveyor-server [OPTIONS]\n\n\
             Options:\n  \
             -c, --config-path PATH   configuration file (overrides CONVEYOR_CONFIG_PATH)\n  \
             -h, --help               print this help"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::from_iter(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn no_arguments_means_defaults() {
        let args = parse(&[]);
        assert_eq!(args.config_path, None);
        assert!(!args.help_requested);
    }

    #[test]
    fn config_path_accepts_all_spellings() {
        assert_eq!(
            parse(&["-c", "a.yaml"]).config_path.as_deref(),
            Some("a.yaml")
        );
        assert_eq!(
            parse(&["--config-path", "b.yaml"]).config_path.as_deref(),
            Some("b.yaml")
        );
        assert_eq!(
            parse(&["--config-path=c.yaml"]).config_path.as_deref(),
            Some("c.yaml")
        );
    }

    #[test]
    fn last_config_path_wins() {
        let args = parse(&["-c", "first.yaml", "--config-path=last.yaml"]);
        assert_eq!(args.config_path.as_deref(), Some("last.yaml"));
    }

    #[test]
    fn dangling_config_flag_yields_no_path() {
        assert_eq!(parse(&["--config-path"]).config_path, None);
    }

    #[test]
    fn help_is_detected_among_other_flags() {
        let args = parse(&["-c", "a.yaml", "--help"]);
        assert!(args.help_requested);
        assert_eq!(args.config_path.as_deref(), Some("a.yaml"));
    }

    #[test]
    fn unknown_arguments_are_ignored() {
        let args = parse(&["--verbose", "positional"]);
        assert_eq!(args.config_path, None);
        assert!(!args.help_requested);
    }
}
