//! Send-file tool — uploads model-authored content as a file.

use async_trait::async_trait;
use relaybot_core::channel::OutgoingFile;
use relaybot_core::error::ToolError;
use relaybot_core::tool::{Tool, ToolArguments, ToolContext, ToolKind};
use tracing::debug;

pub struct SendFileTool;

#[async_trait]
impl Tool for SendFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::SendFile
    }

    fn description(&self) -> &str {
        "Send a text file to the user. Use this for long logs, scripts or configuration files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The full text content of the file"
                },
                "fileName": {
                    "type": "string",
                    "description": "The file name including extension, e.g. 'config.xml'"
                }
            },
            "required": ["content", "fileName"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &ToolArguments) -> Result<String, ToolError> {
        let content = arguments.require("content")?;
        let file_name = arguments.require("fileName")?;

        let file = OutgoingFile {
            filename: file_name.to_string(),
            bytes: content.as_bytes().to_vec(),
        };
        ctx.channel.send_file(&ctx.chat_id, &file).await?;

        debug!(file_name = %file_name, bytes = file.bytes.len(), "File sent by tool");
        Ok(format!("Sent file {file_name}."))
    }
}
