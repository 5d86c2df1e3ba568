//! Prompt Expansion
//!
//! Renders a parsed template against a `PromptState` snapshot. A context
//! group is emitted only when at least one value escape inside it, at any
//! depth, produced non-empty text; literal text and format escapes never
//! make a group visible on their own.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::interpreter::environment::Environment;
use crate::prompt::escapes::{escape_class, format_char, EscapeClass};
use crate::prompt::git::{Git2Probe, GitSnapshot, RepoProbe};
use crate::prompt::parser::{parse_prompt, PromptNode};

/// Glyphs for `\S`, `\F` and `\B`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptGlyphs {
    pub success: String,
    pub failure: String,
    pub branch: String,
}

impl Default for PromptGlyphs {
    fn default() -> Self {
        Self {
            success: "❯".to_string(),
            failure: "✘".to_string(),
            branch: "".to_string(),
        }
    }
}

/// Interactive state the prompt reads
#[derive(Debug, Clone)]
pub struct PromptState {
    pub last_exit: i32,
    pub cwd: PathBuf,
    pub host: String,
    pub is_root: bool,
    pub now: DateTime<Local>,
    pub glyphs: PromptGlyphs,
}

impl PromptState {
    pub fn new(last_exit: i32, cwd: PathBuf) -> Self {
        Self {
            last_exit,
            cwd,
            host: hostname(),
            // SAFETY: geteuid has no preconditions
            is_root: unsafe { libc::geteuid() } == 0,
            now: Local::now(),
            glyphs: PromptGlyphs::default(),
        }
    }
}

/// Expands templates; the git snapshot is read at most once per expander
pub struct PromptExpander<'a> {
    state: &'a PromptState,
    env: &'a Environment,
    probe: &'a dyn RepoProbe,
    git: OnceCell<Option<GitSnapshot>>,
}

impl<'a> PromptExpander<'a> {
    pub fn new(state: &'a PromptState, env: &'a Environment, probe: &'a dyn RepoProbe) -> Self {
        Self {
            state,
            env,
            probe,
            git: OnceCell::new(),
        }
    }

    pub fn expand(&self, template: &str) -> String {
        let mut out = String::new();
        self.render(&parse_prompt(template), &mut out);
        out
    }

    /// Append `nodes` to `out`; true when a value escape produced text
    fn render(&self, nodes: &[PromptNode], out: &mut String) -> bool {
        let mut produced = false;
        for node in nodes {
            match node {
                PromptNode::Text(text) => out.push_str(text),
                PromptNode::Escape(c) => match escape_class(*c) {
                    Some(EscapeClass::Value) => {
                        let value = self.value_escape(*c);
                        produced |= !value.is_empty();
                        out.push_str(&value);
                    }
                    Some(EscapeClass::Format) => out.extend(format_char(*c)),
                    None => {
                        out.push('\\');
                        out.push(*c);
                    }
                },
                PromptNode::Variable(name) => {
                    let value = self.env.get(name).map(|v| v.to_text()).unwrap_or_default();
                    produced |= !value.is_empty();
                    out.push_str(&value);
                }
                PromptNode::Group(children) => {
                    let mut inner = String::new();
                    if self.render(children, &mut inner) {
                        out.push_str(&inner);
                        produced = true;
                    }
                }
            }
        }
        produced
    }

    fn git(&self) -> Option<&GitSnapshot> {
        self.git.get_or_init(|| self.probe.snapshot(&self.state.cwd)).as_ref()
    }

    fn value_escape(&self, c: char) -> String {
        let state = self.state;
        match c {
            'S' if state.last_exit == 0 => state.glyphs.success.clone(),
            'F' if state.last_exit != 0 => state.glyphs.failure.clone(),
            'S' | 'F' => String::new(),
            '?' => state.last_exit.to_string(),
            'G' => self.git().map(|g| g.signs.clone()).unwrap_or_default(),
            'B' => match self.git().and_then(|g| g.branch.as_deref()) {
                Some(branch) => format!("{} {}", state.glyphs.branch, branch),
                None => String::new(),
            },
            'u' => self.env_text("USER"),
            'h' => state.host.split('.').next().unwrap_or_default().to_string(),
            'w' => self.tilde(&state.cwd),
            'W' => match self.tilde(&state.cwd).as_str() {
                "~" => "~".to_string(),
                _ => state
                    .cwd
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| state.cwd.display().to_string()),
            },
            't' => state.now.format("%H:%M:%S").to_string(),
            'T' => state.now.format("%I:%M:%S").to_string(),
            'd' => state.now.format("%a %b %d").to_string(),
            '$' => (if state.is_root { "#" } else { "$" }).to_string(),
            _ => String::new(),
        }
    }

    fn env_text(&self, name: &str) -> String {
        self.env.get(name).map(|v| v.to_text()).unwrap_or_default()
    }

    /// Working directory with the home prefix shown as `~`
    fn tilde(&self, path: &Path) -> String {
        let home = self.env_text("HOME");
        if !home.is_empty() {
            if let Ok(rest) = path.strip_prefix(&home) {
                return if rest.as_os_str().is_empty() {
                    "~".to_string()
                } else {
                    format!("~/{}", rest.display())
                };
            }
        }
        path.display().to_string()
    }
}

/// Expand `template` against live repository state
pub fn expand(template: &str, state: &PromptState, env: &Environment) -> String {
    PromptExpander::new(state, env, &Git2Probe).expand(template)
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer outlives the call and its length is passed along
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return String::new();
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::value::Value;
    use crate::prompt::git::NoRepo;
    use chrono::TimeZone;

    struct FakeRepo(GitSnapshot);

    impl RepoProbe for FakeRepo {
        fn snapshot(&self, _cwd: &Path) -> Option<GitSnapshot> {
            Some(self.0.clone())
        }
    }

    fn state(last_exit: i32) -> PromptState {
        PromptState {
            last_exit,
            cwd: PathBuf::from("/home/me/src/ox"),
            host: "box.example.org".to_string(),
            is_root: false,
            now: Local.with_ymd_and_hms(2024, 5, 26, 14, 3, 9).unwrap(),
            glyphs: PromptGlyphs {
                success: "ok".into(),
                failure: "err".into(),
                branch: "".into(),
            },
        }
    }

    fn dirty_master() -> FakeRepo {
        FakeRepo(GitSnapshot {
            branch: Some("master".into()),
            signs: "!?".into(),
        })
    }

    #[test]
    fn test_context_groups_inside_repository() {
        let (state, env, repo) = (state(0), Environment::new(), dirty_master());
        let out = PromptExpander::new(&state, &env, &repo).expand("\\(on \\B\\([\\G]\\)\\n\\)");
        assert_eq!(out, "on  master[!?]\n");
    }

    #[test]
    fn test_context_groups_outside_repository() {
        let (state, env) = (state(0), Environment::new());
        let out = PromptExpander::new(&state, &env, &NoRepo).expand("\\(on \\B\\([\\G]\\)\\n\\)");
        assert_eq!(out, "");
    }

    #[test]
    fn test_clean_repository_hides_inner_group() {
        let (state, env) = (state(0), Environment::new());
        let repo = FakeRepo(GitSnapshot {
            branch: Some("main".into()),
            signs: String::new(),
        });
        let out = PromptExpander::new(&state, &env, &repo).expand("\\(on \\B\\([\\G]\\)\\)");
        assert_eq!(out, "on  main");
    }

    #[test]
    fn test_status_glyphs() {
        let env = Environment::new();
        let ok = state(0);
        let failed = state(2);
        let template = "\\S\\F \\?";
        assert_eq!(PromptExpander::new(&ok, &env, &NoRepo).expand(template), "ok 0");
        assert_eq!(PromptExpander::new(&failed, &env, &NoRepo).expand(template), "err 2");
        assert_eq!(PromptExpander::new(&ok, &env, &NoRepo).expand("\\(exit \\F\\)"), "");
    }

    #[test]
    fn test_directory_host_time() {
        let env = Environment::from_vars([("HOME", "/home/me"), ("USER", "me")]);
        let state = state(0);
        let expander = PromptExpander::new(&state, &env, &NoRepo);
        assert_eq!(expander.expand("\\u@\\h:\\w \\W"), "me@box:~/src/ox ox");
        assert_eq!(expander.expand("\\t \\T \\d \\$"), "14:03:09 02:03:09 Sun May 26 $");
    }

    #[test]
    fn test_env_lookup_and_unknown_escape() {
        let mut env = Environment::new();
        env.assign("MOOD", Value::Str("calm".into())).unwrap();
        let state = state(0);
        let expander = PromptExpander::new(&state, &env, &NoRepo);
        assert_eq!(expander.expand("${MOOD} \\q"), "calm \\q");
        assert_eq!(expander.expand("\\([${UNSET}]\\)"), "");
    }
}
