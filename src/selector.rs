//! Ways of letting the user pick a profile.
//!
//! A [`Selector`] gets every profile as a [`Choice`], with ineligible ones
//! disabled, and answers with a [`Selection`]. Applying the profile is left
//! to the caller.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: String,
    pub title: String,
    pub icon: Option<PathBuf>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Choices {
    /// Every profile, in configuration order.
    pub items: Vec<Choice>,
    /// Index into `items` of the entry to highlight.
    pub preselected: Option<usize>,
    /// Shown to the user, e.g. when the display query failed.
    pub warning: Option<String>,
}

impl Choices {
    pub fn enabled(&self) -> impl Iterator<Item = &Choice> {
        self.items.iter().filter(|c| c.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Apply(String),
    /// Query the ports again and show an updated list.
    Refresh,
    Cancel,
}

#[allow(async_fn_in_trait)]
pub trait Selector {
    async fn select(&mut self, choices: &Choices) -> Result<Selection>;
}

/// Numbered list on the terminal.
pub struct PromptSelector<R, W> {
    reader: R,
    writer: W,
}

impl PromptSelector<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R, W> PromptSelector<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    async fn render(&mut self, choices: &Choices) -> io::Result<()> {
        let mut out = String::from("\nSelect a screen configuration:\n");
        if let Some(warning) = &choices.warning {
            out.push_str(&format!("warning: {}\n", warning));
        }
        for (i, choice) in choices.items.iter().enumerate() {
            let marker = if choices.preselected == Some(i) { '*' } else { ' ' };
            let disabled = if choice.enabled { "" } else { "  [unavailable]" };
            out.push_str(&format!(" {} {}) {}{}\n", marker, i + 1, choice.title, disabled));
        }
        self.writer.write_all(out.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn write(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }
}

fn parse_answer(answer: &str, choices: &Choices) -> std::result::Result<Selection, String> {
    match answer {
        "q" | "quit" => return Ok(Selection::Cancel),
        "r" | "refresh" => return Ok(Selection::Refresh),
        _ => {}
    }

    let index = if answer.is_empty() {
        choices
            .preselected
            .ok_or_else(|| "No default, enter a number".to_string())?
    } else {
        let n: usize = answer
            .parse()
            .map_err(|_| format!("'{}' is not a number", answer))?;
        n.checked_sub(1)
            .filter(|i| *i < choices.items.len())
            .ok_or_else(|| format!("Choose between 1 and {}", choices.items.len()))?
    };

    let choice = &choices.items[index];
    if !choice.enabled {
        return Err(format!("'{}' is not available right now", choice.title));
    }
    Ok(Selection::Apply(choice.id.clone()))
}

impl<R, W> Selector for PromptSelector<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn select(&mut self, choices: &Choices) -> Result<Selection> {
        self.render(choices).await?;

        loop {
            self.write("Choice [number, r = refresh, q = quit]: ").await?;

            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(Selection::Cancel);
            }

            match parse_answer(line.trim(), choices) {
                Ok(selection) => return Ok(selection),
                Err(message) => self.write(&format!("{}\n", message)).await?,
            }
        }
    }
}

/// dmenu-style launcher (`rofi -dmenu`, `fuzzel --dmenu`, ...): titles of the
/// enabled choices go to its stdin, the chosen line comes back on stdout.
/// Titles shared by several enabled choices get the profile id appended so
/// every line maps back to exactly one profile.
#[derive(Debug, Clone)]
pub struct MenuSelector {
    command: String,
    shell: String,
}

impl MenuSelector {
    pub fn new(command: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: shell.into(),
        }
    }
}

impl Selector for MenuSelector {
    async fn select(&mut self, choices: &Choices) -> Result<Selection> {
        if let Some(warning) = &choices.warning {
            warn!("{}", warning);
        }

        let enabled: Vec<&Choice> = choices.enabled().collect();
        if enabled.is_empty() {
            warn!("No profile is available for the connected ports");
            return Ok(Selection::Cancel);
        }

        // row of the preselected entry among the lines the launcher receives
        let selected_row = choices
            .preselected
            .and_then(|i| choices.items.get(i))
            .and_then(|pre| enabled.iter().position(|c| c.id == pre.id));

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        if let Some(row) = selected_row {
            cmd.env("CHRANDR_SELECTED_ROW", row.to_string());
        }

        debug!("Starting launcher: {}", self.command);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start launcher `{}`", self.command))?;

        let labels = menu_labels(&enabled);
        if let Some(mut stdin) = child.stdin.take() {
            let titles: String = labels.iter().map(|label| format!("{}\n", label)).collect();
            // the launcher may exit before reading everything
            if let Err(e) = stdin.write_all(titles.as_bytes()).await {
                debug!("Launcher closed its input early: {}", e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for launcher")?;

        if !output.status.success() {
            debug!("Launcher exited with {}, treating as cancel", output.status);
            return Ok(Selection::Cancel);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let picked = stdout.lines().next().unwrap_or("").trim();
        if picked.is_empty() {
            return Ok(Selection::Cancel);
        }

        match labels.iter().position(|label| label == picked) {
            Some(row) => Ok(Selection::Apply(enabled[row].id.clone())),
            None => anyhow::bail!("Launcher returned an unknown entry: '{}'", picked),
        }
    }
}

fn menu_labels(enabled: &[&Choice]) -> Vec<String> {
    enabled
        .iter()
        .map(|choice| {
            let shared = enabled
                .iter()
                .filter(|other| other.title == choice.title)
                .count()
                > 1;
            if shared {
                format!("{} ({})", choice.title, choice.id)
            } else {
                choice.title.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices() -> Choices {
        Choices {
            items: vec![
                Choice {
                    id: "vga_laptop".to_string(),
                    title: "VGA and laptop".to_string(),
                    icon: None,
                    enabled: false,
                },
                Choice {
                    id: "laptop".to_string(),
                    title: "Laptop".to_string(),
                    icon: None,
                    enabled: true,
                },
                Choice {
                    id: "tv".to_string(),
                    title: "Television".to_string(),
                    icon: None,
                    enabled: true,
                },
            ],
            preselected: Some(1),
            warning: None,
        }
    }

    async fn prompt(input: &str, choices: &Choices) -> (Selection, String) {
        let mut output = Vec::new();
        let selection = {
            let mut selector = PromptSelector::new(input.as_bytes(), &mut output);
            selector.select(choices).await.unwrap()
        };
        (selection, String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn test_prompt_by_number() {
        let (selection, out) = prompt("3\n", &choices()).await;
        assert_eq!(selection, Selection::Apply("tv".to_string()));
        assert!(out.contains(" * 2) Laptop"));
        assert!(out.contains("1) VGA and laptop  [unavailable]"));
    }

    #[tokio::test]
    async fn test_prompt_enter_takes_preselected() {
        let (selection, _) = prompt("\n", &choices()).await;
        assert_eq!(selection, Selection::Apply("laptop".to_string()));
    }

    #[tokio::test]
    async fn test_prompt_rejects_disabled_and_out_of_range() {
        let (selection, out) = prompt("1\n9\nabc\n2\n", &choices()).await;
        assert_eq!(selection, Selection::Apply("laptop".to_string()));
        assert!(out.contains("'VGA and laptop' is not available right now"));
        assert!(out.contains("Choose between 1 and 3"));
        assert!(out.contains("'abc' is not a number"));
    }

    #[tokio::test]
    async fn test_prompt_refresh_quit_and_eof() {
        assert_eq!(prompt("r\n", &choices()).await.0, Selection::Refresh);
        assert_eq!(prompt("q\n", &choices()).await.0, Selection::Cancel);
        assert_eq!(prompt("", &choices()).await.0, Selection::Cancel);
    }

    #[tokio::test]
    async fn test_prompt_shows_warning() {
        let mut choices = choices();
        choices.warning = Some("xrandr not found".to_string());
        choices.preselected = None;
        let (selection, out) = prompt("\nq\n", &choices).await;
        assert_eq!(selection, Selection::Cancel);
        assert!(out.contains("warning: xrandr not found"));
        assert!(out.contains("No default, enter a number"));
    }

    #[tokio::test]
    async fn test_menu_picks_returned_title() {
        // first enabled entry is "Laptop"
        let mut menu = MenuSelector::new("head -n 1", "/bin/sh");
        let selection = menu.select(&choices()).await.unwrap();
        assert_eq!(selection, Selection::Apply("laptop".to_string()));
    }

    #[tokio::test]
    async fn test_menu_gets_selected_row() {
        let mut choices = choices();
        choices.preselected = Some(2);
        // row 1 among enabled entries is "Television"
        let mut menu = MenuSelector::new(
            r#"sed -n "$((CHRANDR_SELECTED_ROW + 1))p""#,
            "/bin/sh",
        );
        let selection = menu.select(&choices).await.unwrap();
        assert_eq!(selection, Selection::Apply("tv".to_string()));
    }

    #[tokio::test]
    async fn test_menu_cancel() {
        let mut menu = MenuSelector::new("cat > /dev/null; exit 1", "/bin/sh");
        assert_eq!(menu.select(&choices()).await.unwrap(), Selection::Cancel);

        let mut menu = MenuSelector::new("cat > /dev/null", "/bin/sh");
        assert_eq!(menu.select(&choices()).await.unwrap(), Selection::Cancel);
    }

    #[tokio::test]
    async fn test_menu_unknown_entry() {
        let mut menu = MenuSelector::new("cat > /dev/null; echo Toaster", "/bin/sh");
        assert!(menu.select(&choices()).await.is_err());
    }

    #[tokio::test]
    async fn test_menu_with_nothing_enabled() {
        let mut choices = choices();
        for item in &mut choices.items {
            item.enabled = false;
        }
        let mut menu = MenuSelector::new("head -n 1", "/bin/sh");
        assert_eq!(menu.select(&choices).await.unwrap(), Selection::Cancel);
    }

    #[tokio::test]
    async fn test_menu_shared_titles_map_to_their_own_profile() {
        let mut choices = choices();
        choices.items[0].enabled = true;
        choices.items[0].title = "Docked".to_string();
        choices.items[1].title = "Docked".to_string();
        choices.items[0].id = "home_dock".to_string();
        choices.items[1].id = "office_dock".to_string();

        let mut menu = MenuSelector::new("sed -n 2p", "/bin/sh");
        let selection = menu.select(&choices).await.unwrap();
        assert_eq!(selection, Selection::Apply("office_dock".to_string()));

        let mut menu = MenuSelector::new("cat > /dev/null; echo 'Docked (home_dock)'", "/bin/sh");
        let selection = menu.select(&choices).await.unwrap();
        assert_eq!(selection, Selection::Apply("home_dock".to_string()));

        let mut menu = MenuSelector::new("sed -n 3p", "/bin/sh");
        let selection = menu.select(&choices).await.unwrap();
        assert_eq!(selection, Selection::Apply("tv".to_string()));
    }
}
