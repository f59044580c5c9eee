/*
 *  Copyright 2026 Taskforge Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Per-agent on-disk prompt materials: `SOUL.md`, `INSTRUCTIONS.md`,
//! `CONTEXT.md` under `{agents_root}/{agent_name}/`. An agent's
//! system-prompt is the concatenation of these three files, seeded with
//! role-appropriate defaults the first time the agent is created.

use std::path::{Path, PathBuf};

pub const STANDARD_FILES: [&str; 3] = ["SOUL.md", "INSTRUCTIONS.md", "CONTEXT.md"];

pub struct AgentFiles {
    root: PathBuf,
}

impl AgentFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn agent_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates the agent's directory and any missing standard files,
    /// seeded with role-appropriate defaults. Idempotent.
    pub fn ensure_agent_dir(&self, name: &str, role: &str) -> std::io::Result<PathBuf> {
        let dir = self.agent_dir(name);
        std::fs::create_dir_all(&dir)?;
        for filename in STANDARD_FILES {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, default_content(filename, name, role))?;
            }
        }
        Ok(dir)
    }

    /// Reads an agent's markdown file, or `""` if it doesn't exist.
    pub fn read_file(&self, name: &str, filename: &str) -> String {
        let path = self.agent_dir(name).join(filename);
        std::fs::read_to_string(path).unwrap_or_default()
    }

    pub fn write_file(&self, name: &str, filename: &str, content: &str) -> std::io::Result<()> {
        let dir = self.agent_dir(name);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(filename), content)
    }

    pub fn list_files(&self, name: &str) -> Vec<String> {
        let dir = self.agent_dir(name);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut files: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".md"))
            .collect();
        files.sort();
        files
    }

    /// Concatenates SOUL + INSTRUCTIONS + CONTEXT into the agent's
    /// system-prompt block, creating defaults on first use.
    pub fn system_prompt(&self, name: &str, role: &str) -> String {
        let _ = self.ensure_agent_dir(name, role);
        STANDARD_FILES
            .iter()
            .map(|f| self.read_file(name, f))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn role_instructions(role: &str) -> &'static str {
    match role.to_lowercase().as_str() {
        "programming" => {
            "- Write clean, well-structured code\n\
             - Include full file paths and complete code blocks\n\
             - Handle edge cases and error conditions\n\
             - Follow existing project patterns and conventions"
        }
        "architecture" => {
            "- Make high-level design decisions\n\
             - Identify tradeoffs between approaches\n\
             - Create concrete implementation plans\n\
             - Consider scalability, maintainability, and security"
        }
        "reviewing" => {
            "- Thoroughly review code and deliverables\n\
             - Identify bugs, issues, and risks\n\
             - Propose specific fixes and improvements\n\
             - Give a clear PASS or FAIL verdict"
        }
        "reporting" => {
            "- Summarize work clearly and concisely\n\
             - Highlight key findings and next steps\n\
             - Use structured formatting for readability\n\
             - Include metrics where available"
        }
        _ => "- Complete tasks as assigned\n- Be thorough and accurate",
    }
}

fn default_content(filename: &str, name: &str, role: &str) -> String {
    match filename {
        "SOUL.md" => format!(
            "# {name} — Soul\n\n\
             You are **{name}**, a {role} agent in an autonomous task-execution system.\n\n\
             ## Personality\n\
             - Professional and focused\n\
             - Clear and concise in communication\n\
             - Thorough in your work\n\n\
             ## Values\n\
             - Accuracy over speed\n\
             - Completeness over brevity when it matters\n\
             - Always explain your reasoning\n"
        ),
        "INSTRUCTIONS.md" => format!(
            "# {name} — Instructions\n\n\
             ## Role\n\
             You are the **{role}** agent. Your primary responsibilities:\n\n\
             {}\n\n\
             ## Output Format\n\
             - Return your output in markdown\n\
             - Include a short \"Result\" section first with a summary\n\
             - Be specific and actionable\n",
            role_instructions(role)
        ),
        "CONTEXT.md" => format!(
            "# {name} — Context\n\n\
             ## Project Context\n\
             This agent operates within an autonomous task-management system.\n\n\
             ## Conventions\n\
             - Follow existing code patterns and project conventions\n\
             - Use the tech stack already established in the project\n"
        ),
        other => format!("# {name} — {other}\n\n(Custom file)\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_agent_dir_seeds_standard_files() {
        let tmp = tempfile::tempdir().unwrap();
        let files = AgentFiles::new(tmp.path());
        files.ensure_agent_dir("Ada", "programming").unwrap();
        for f in STANDARD_FILES {
            assert!(tmp.path().join("Ada").join(f).exists());
        }
    }

    #[test]
    fn system_prompt_concatenates_all_three_files() {
        let tmp = tempfile::tempdir().unwrap();
        let files = AgentFiles::new(tmp.path());
        let prompt = files.system_prompt("Rex", "reviewing");
        assert!(prompt.contains("Rex"));
        assert!(prompt.contains("PASS or FAIL"));
    }

    #[test]
    fn custom_files_are_never_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let files = AgentFiles::new(tmp.path());
        files.ensure_agent_dir("Ada", "programming").unwrap();
        files.write_file("Ada", "SOUL.md", "custom soul").unwrap();
        files.ensure_agent_dir("Ada", "programming").unwrap();
        assert_eq!(files.read_file("Ada", "SOUL.md"), "custom soul");
    }
}
