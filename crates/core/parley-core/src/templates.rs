//! Template engine and default prompt templates

use crate::types::{Character, State};
use crate::{ParleyError, Result};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Template engine wrapper
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    /// Create a new template engine
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        // Prompts are plain text, never HTML
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars.register_helper("uppercase", Box::new(uppercase_helper));
        handlebars.register_helper("lowercase", Box::new(lowercase_helper));

        Self { handlebars }
    }

    /// Render a template with data
    pub fn render(
        &self,
        template: &str,
        data: &HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        self.handlebars
            .render_template(template, data)
            .map_err(|e| ParleyError::template(e.to_string()))
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose a prompt from state using a template
pub fn compose_prompt_from_state(state: &State, template: &str) -> Result<String> {
    TemplateEngine::new().render(template, &state.to_template_data())
}

/// Character override for `name`, else `default`
pub fn resolve_template<'a>(character: &'a Character, name: &str, default: &'a str) -> &'a str {
    character.template(name).unwrap_or(default)
}

fn uppercase_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h
        .param(0)
        .ok_or_else(|| handlebars::RenderErrorReason::ParamNotFoundForIndex("uppercase", 0))?;

    out.write(&param.value().as_str().unwrap_or("").to_uppercase())?;
    Ok(())
}

fn lowercase_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h
        .param(0)
        .ok_or_else(|| handlebars::RenderErrorReason::ParamNotFoundForIndex("lowercase", 0))?;

    out.write(&param.value().as_str().unwrap_or("").to_lowercase())?;
    Ok(())
}

/// Template names characters may override
pub mod names {
    /// Telegram should-respond prompt
    pub const TELEGRAM_SHOULD_RESPOND: &str = "telegramShouldRespondTemplate";
    /// Telegram reply prompt
    pub const TELEGRAM_MESSAGE_HANDLER: &str = "telegramMessageHandlerTemplate";
    /// Twitter should-respond prompt
    pub const TWITTER_SHOULD_RESPOND: &str = "twitterShouldRespondTemplate";
    /// Twitter reply prompt
    pub const TWITTER_MESSAGE_HANDLER: &str = "twitterMessageHandlerTemplate";
    /// Twitter standalone post prompt
    pub const TWITTER_POST: &str = "twitterPostTemplate";
    /// Twitter timeline action prompt
    pub const TWITTER_ACTION: &str = "twitterActionTemplate";
    /// Twitter quote prompt
    pub const TWITTER_QUOTE: &str = "twitterQuoteTemplate";
}

/// Appended to every should-respond prompt
pub const SHOULD_RESPOND_FOOTER: &str = "The available options are [RESPOND], [IGNORE], or [STOP]. Choose the most appropriate option.
If {{agentName}} is talking too much, you can choose [IGNORE].

Your response must include one of the options.";

/// Appended to every prompt that expects a JSON reply object
pub const MESSAGE_COMPLETION_FOOTER: &str = r#"
Response format should be formatted in a JSON block like this:
```json
{ "user": "{{agentName}}", "text": string, "action": "string" }
```"#;

/// Appended to the timeline action prompt
pub const ACTION_RESPONSE_FOOTER: &str = "Choose any combination of [LIKE], [RETWEET], [QUOTE], [REPLY] and [MEME: <concept>] that are appropriate. Each action must be on its own line. Your response must only include the chosen actions.";

/// System prompt for the platform format pass
pub const FORMAT_SYSTEM_PROMPT: &str = "You are a tweet formatter.
Your only job is to take the input text and format it as a tweet.
If the input already looks like a single tweet, return it exactly as is.
If the input looks like multiple tweets, pick one.
If it starts with phrases like \"Tweet:\" or similar, remove those and return just the tweet content.
Never say \"No Tweet found\" - if you receive valid text, that IS the tweet.
Just return the tweet content itself.";

/// Default Telegram should-respond prompt
pub const TELEGRAM_SHOULD_RESPOND_TEMPLATE: &str = "# Task: Decide if {{agentName}} should respond.
About {{agentName}}:
{{bio}}

# INSTRUCTIONS: Determine if {{agentName}} should respond to the message and participate in the conversation. Just respond with \"RESPOND\" or \"IGNORE\" or \"STOP\".

# RESPONSE EXAMPLES
<user>: these bots need to chill fr
Result: [IGNORE]

<user>: {{agentName}} you up?
Result: [RESPOND]

<user>: shut up {{agentName}}
Result: [STOP]

<user>: gm frens
Result: [IGNORE]

{{agentName}} is in a room with other users and does not want to be annoying.
Respond with [RESPOND] to messages directed at {{agentName}} and to conversations relevant to their background.
Respond with [IGNORE] to very short messages or filler words unless {{agentName}} is being addressed.
If a user asks {{agentName}} to be quiet, or the conversation has concluded, respond with [STOP].

{{recentMessages}}

# INSTRUCTIONS: Choose the option that best describes {{agentName}}'s response to the last message. Ignore messages addressed to someone else.
";

/// Default Telegram reply prompt
pub const TELEGRAM_MESSAGE_HANDLER_TEMPLATE: &str = "# Task: Generate dialog for the character {{agentName}}.
About {{agentName}}:
{{bio}}
{{lore}}

{{characterMessageExamples}}

{{messageDirections}}

{{recentMessages}}

# Task: Write the next message for {{agentName}} in reply to {{senderName}}. Stay in character and keep it conversational.
";

/// Default Twitter should-respond prompt
pub const TWITTER_SHOULD_RESPOND_TEMPLATE: &str = "# INSTRUCTIONS: Determine if {{agentName}} (@{{twitterUserName}}) should respond to the message and participate in the conversation. Do not comment. Just respond with \"RESPOND\", \"IGNORE\" or \"STOP\".

{{agentName}} should RESPOND to posts directed at them and to conversations relevant to their background.
Unless directly addressed, {{agentName}} should IGNORE posts that are very short or carry little information.
If a user asks {{agentName}} to stop, or the conversation has concluded, {{agentName}} should STOP.

Current Post:
{{currentPost}}

Thread of Tweets You Are Replying To:

{{formattedConversation}}

# INSTRUCTIONS: Respond with [RESPOND] if {{agentName}} should respond, [IGNORE] if {{agentName}} should not respond to the last message and [STOP] if {{agentName}} should stop participating in the conversation.
";

/// Default Twitter reply prompt
pub const TWITTER_MESSAGE_HANDLER_TEMPLATE: &str = "{{timeline}}

# Task: Generate a post for the character {{agentName}}.
About {{agentName}} (@{{twitterUserName}}):
{{bio}}
{{lore}}
{{topics}}

{{characterPostExamples}}

{{postDirections}}

# Task: Generate a post/reply for {{agentName}} (@{{twitterUserName}}):
Current Post:
{{currentPost}}
Thread of Tweets You Are Replying To:

{{formattedConversation}}
";

/// Default Twitter standalone post prompt
pub const TWITTER_POST_TEMPLATE: &str = "{{timeline}}

About {{agentName}} (@{{twitterUserName}}):
{{bio}}
{{lore}}
{{postDirections}}

{{characterPostExamples}}

# Task: Generate a post in the voice and style of {{agentName}}, aka @{{twitterUserName}}.
Do not add commentary or acknowledge this request, just write the post.
Your response should not contain any questions. Brief, concise statements only. No emojis. Use \\n\\n (double spaces) between statements.";

/// Default Twitter timeline action prompt
pub const TWITTER_ACTION_TEMPLATE: &str = "# INSTRUCTIONS: Analyze the following tweet and determine which actions {{agentName}} (@{{twitterUserName}}) should take. Do not comment. Just respond with the appropriate action tags.

About {{agentName}} (@{{twitterUserName}}):
{{bio}}
{{lore}}
{{postDirections}}

Response Guidelines:
- {{agentName}} is selective about engagement and doesn't want to be annoying
- Retweets and quotes are extremely rare
- Direct mentions get very high priority for replies and quote tweets
- Avoid short or low-effort content and topics outside {{agentName}}'s interests

Scoring System (1-10):
- Baseline Score: Start at 5/10
- Add points for direct mentions of {{agentName}} (+4), strong alignment with the character (+2), high effort content (+2)
- Subtract points for low effort content (-2), irrelevant content (-2), recent engagement with the same user (-1)

Available Actions and Thresholds:
[LIKE] - Content resonates with {{agentName}}'s interests (7/10)
[RETWEET] - Exceptional content that perfectly aligns with the character (9/10)
[QUOTE] - Rare opportunity to add significant value (8/10)
[REPLY] - Highly relevant response opportunity (8/10)
[MEME: <meme concept>] - Perfect memetic opportunity (10/10)

Current Tweet:
{{currentTweet}}

# INSTRUCTIONS: Respond with appropriate action tags based on the above criteria and the current tweet. An action must meet its threshold to be included.
";

/// Default Twitter quote prompt
pub const TWITTER_QUOTE_TEMPLATE: &str = "# Task: Generate a post for the character {{agentName}}.
About {{agentName}} (@{{twitterUserName}}):
{{bio}}
{{lore}}
{{topics}}

{{characterPostExamples}}

{{postDirections}}

# Task: Generate a post for {{agentName}} (@{{twitterUserName}}) using the quoted tweet as additional context:
Quoted Post:
{{currentTweet}}
";

/// Attach the footer that matches the expected output shape
pub fn with_footer(template: &str, footer: &str) -> String {
    format!("{}\n{}", template.trim_end(), footer)
}
