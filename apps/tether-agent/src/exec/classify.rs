/// What a command string asks the agent to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// `cd [target]`. `None` means the home directory.
    Navigate { target: Option<String> },
    PrintWorkingDirectory,
    ListDirectory,
    Shell,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Navigate { .. } => "navigate",
            Classification::PrintWorkingDirectory => "pwd",
            Classification::ListDirectory => "ls",
            Classification::Shell => "shell",
        }
    }
}

/// Classifies a trimmed, non-empty command. Returns `None` for blank input.
pub fn classify(command: &str) -> Option<Classification> {
    let mut words = command.split_whitespace();
    let head = words.next()?;
    let classification = match head {
        "cd" => {
            let rest: Vec<&str> = words.collect();
            Classification::Navigate {
                target: (!rest.is_empty()).then(|| rest.join(" ")),
            }
        }
        "pwd" => Classification::PrintWorkingDirectory,
        "ls" => Classification::ListDirectory,
        _ => Classification::Shell,
    };
    Some(classification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_commands_have_no_classification() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("  \t\n"), None);
    }

    #[test]
    fn navigation_target_is_rejoined_with_single_spaces() {
        assert_eq!(
            classify("cd"),
            Some(Classification::Navigate { target: None })
        );
        assert_eq!(
            classify("  cd   My   Documents "),
            Some(Classification::Navigate {
                target: Some("My Documents".into())
            })
        );
    }

    #[test]
    fn only_the_first_word_selects_the_variant() {
        assert_eq!(classify("pwd"), Some(Classification::PrintWorkingDirectory));
        assert_eq!(classify("ls -la /tmp"), Some(Classification::ListDirectory));
        assert_eq!(classify("lsblk"), Some(Classification::Shell));
        assert_eq!(classify("echo cd"), Some(Classification::Shell));
        assert_eq!(classify("cdrecord"), Some(Classification::Shell));
    }
}
