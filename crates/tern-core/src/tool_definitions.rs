//! Tool definitions for the agent's available tools.
//!
//! The catalog is fixed: the six core tools are always offered, and
//! `Computer` is added only when desktop automation is enabled.

use serde_json::json;
use tern_providers::Tool;

use crate::tools::computer::ACTIONS;
use crate::tools::ToolName;

/// Configuration for which optional tool sets to enable
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolConfig {
    pub computer_control: bool,
}

impl ToolConfig {
    pub fn new(computer_control: bool) -> Self {
        Self { computer_control }
    }
}

/// Create tool definitions for native tool calling providers.
pub fn create_tool_definitions(config: ToolConfig) -> Vec<Tool> {
    let mut tools = create_core_tools();
    if config.computer_control {
        tools.push(create_computer_tool());
    }
    tools
}

/// The schema for one tool, whether or not it is currently offered.
pub fn definition_for(name: ToolName) -> Tool {
    match name {
        ToolName::Computer => create_computer_tool(),
        other => create_core_tools()
            .into_iter()
            .find(|t| t.name == other.as_str())
            .unwrap_or_else(create_computer_tool),
    }
}

/// Create the core tools that are always available
fn create_core_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: ToolName::Bash.as_str().to_string(),
            description: "Run a shell command in the working directory. Output (stdout and stderr combined) is capped, and the command is killed if it exceeds its timeout. Returns the output followed by the exit status.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    },
                    "timeout_secs": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Optional timeout in seconds; cannot exceed the configured maximum"
                    }
                },
                "required": ["command"]
            }),
        },
        Tool {
            name: ToolName::Read.as_str().to_string(),
            description: "Read a text file. Relative paths are resolved against the working directory. Use offset and limit to read a range of lines.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The file path to read"
                    },
                    "offset": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "First line to return (1-based)"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of lines to return"
                    }
                },
                "required": ["path"]
            }),
        },
        Tool {
            name: ToolName::Write.as_str().to_string(),
            description: "Write content to a file, replacing it entirely. Parent directories are created as needed.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The file path to write to"
                    },
                    "content": {
                        "type": "string",
                        "description": "The complete new file content"
                    }
                },
                "required": ["path", "content"]
            }),
        },
        Tool {
            name: ToolName::Edit.as_str().to_string(),
            description: "Replace an exact piece of text in a file. old_string must occur exactly once; if it is missing or ambiguous the file is left unchanged and an error is returned. Include enough surrounding lines to make the match unique.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The file to edit"
                    },
                    "old_string": {
                        "type": "string",
                        "description": "The exact text to replace"
                    },
                    "new_string": {
                        "type": "string",
                        "description": "The replacement text"
                    }
                },
                "required": ["path", "old_string", "new_string"]
            }),
        },
        Tool {
            name: ToolName::Glob.as_str().to_string(),
            description: "Find files by glob pattern. Patterns without '/' match file names at any depth (e.g. '*.rs'); patterns with '/' match paths relative to the search root (e.g. 'src/**/*.ts'). Version-control and dependency directories are skipped.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search (defaults to the working directory)"
                    }
                },
                "required": ["pattern"]
            }),
        },
        Tool {
            name: ToolName::Grep.as_str().to_string(),
            description: "Search file contents with a regular expression. Returns matching lines as path:line: text. Binary files and version-control and dependency directories are skipped.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regular expression to search for"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search (defaults to the working directory)"
                    },
                    "include": {
                        "type": "string",
                        "description": "Only search files matching this glob, e.g. '*.py'"
                    },
                    "case_insensitive": {
                        "type": "boolean",
                        "description": "Ignore case when matching"
                    }
                },
                "required": ["pattern"]
            }),
        },
    ]
}

fn create_computer_tool() -> Tool {
    Tool {
        name: ToolName::Computer.as_str().to_string(),
        description: "Control the desktop: take screenshots, move and click the pointer, type text, press key chords, scroll, read or set the clipboard, and list or focus windows. Coordinates are screen pixels.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ACTIONS,
                    "description": "The operation to perform"
                },
                "x": {"type": "integer", "description": "X coordinate (click, move, drag start)"},
                "y": {"type": "integer", "description": "Y coordinate (click, move, drag start)"},
                "to_x": {"type": "integer", "description": "Drag end X coordinate"},
                "to_y": {"type": "integer", "description": "Drag end Y coordinate"},
                "button": {
                    "type": "string",
                    "enum": ["left", "right", "middle"],
                    "description": "Mouse button for click"
                },
                "double": {"type": "boolean", "description": "Double-click"},
                "direction": {
                    "type": "string",
                    "enum": ["up", "down", "left", "right"],
                    "description": "Scroll direction"
                },
                "amount": {"type": "integer", "minimum": 1, "description": "Scroll steps"},
                "text": {"type": "string", "description": "Text to type or place on the clipboard"},
                "keys": {"type": "string", "description": "Key chord such as 'ctrl+shift+t' or 'enter'"},
                "title": {"type": "string", "description": "Window title or application to focus"},
                "window": {"type": "string", "description": "Capture only this window (screenshot)"}
            },
            "required": ["action"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_tools_are_the_fixed_catalog() {
        let names: Vec<String> = create_tool_definitions(ToolConfig::default())
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Bash", "Read", "Write", "Edit", "Glob", "Grep"]);
    }

    #[test]
    fn test_computer_tool_when_enabled() {
        let tools = create_tool_definitions(ToolConfig::new(true));
        assert_eq!(tools.len(), 7);
        assert_eq!(tools[6].name, "Computer");
        assert_eq!(tools[6].input_schema["properties"]["action"]["enum"].as_array().unwrap().len(), ACTIONS.len());
    }

    #[test]
    fn test_tool_has_required_fields() {
        for tool in create_tool_definitions(ToolConfig::new(true)) {
            assert!(!tool.description.is_empty());
            assert_eq!(tool.input_schema["type"], "object");
            assert!(tool.input_schema["required"].as_array().is_some_and(|r| !r.is_empty()));
        }
    }

    #[test]
    fn test_definition_for_each_name() {
        for name in ToolName::ALL {
            assert_eq!(definition_for(name).name, name.as_str());
        }
    }
}
