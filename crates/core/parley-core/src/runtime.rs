//! Agent runtime: identity, persona, gateway, store and shutdown signal

use crate::classifier::ResponseClassifier;
use crate::config::AgentSettings;
use crate::gateway::CompletionGateway;
use crate::generator::ContentGenerator;
use crate::memory_store::MemoryStore;
use crate::templates::{compose_prompt_from_state, resolve_template, with_footer};
use crate::types::*;
use crate::utils::{string_to_uuid, Logger};
use crate::Result;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Number of recent room memories rendered into prompts
pub const RECENT_MESSAGE_COUNT: usize = 20;

/// Options for [`AgentRuntime::new`]
pub struct RuntimeOpts {
    /// Fixed agent id; derived from the character name when `None`
    pub agent_id: Option<UUID>,
    /// Persona
    pub character: Character,
    /// Agent-wide settings
    pub settings: AgentSettings,
    /// Completion gateway
    pub gateway: Arc<CompletionGateway>,
    /// Memory store
    pub store: Arc<dyn MemoryStore>,
    /// Root logger
    pub logger: Logger,
}

/// Shared state for every platform client of one agent
pub struct AgentRuntime {
    /// Agent id
    pub agent_id: UUID,
    /// Persona
    pub character: Character,
    /// Agent-wide settings
    pub settings: AgentSettings,
    gateway: Arc<CompletionGateway>,
    store: Arc<dyn MemoryStore>,
    logger: Logger,
    cancel: CancellationToken,
}

impl AgentRuntime {
    /// Create a runtime
    pub fn new(opts: RuntimeOpts) -> Self {
        let agent_id = opts
            .agent_id
            .unwrap_or_else(|| string_to_uuid(&opts.character.name));
        let logger = opts.logger.child(&opts.character.name);
        logger.info(&format!("agent runtime ready (id {})", agent_id));

        Self {
            agent_id,
            character: opts.character,
            settings: opts.settings,
            gateway: opts.gateway,
            store: opts.store,
            logger,
            cancel: CancellationToken::new(),
        }
    }

    /// Completion gateway
    pub fn gateway(&self) -> &Arc<CompletionGateway> {
        &self.gateway
    }

    /// Memory store
    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Logger for a component of this agent
    pub fn logger(&self, component: &str) -> Logger {
        self.logger.child(component)
    }

    /// Token cancelled on shutdown
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every retry loop and scheduler owned by this agent
    pub fn shutdown(&self) {
        self.logger.info("shutting down");
        self.cancel.cancel();
    }

    /// Classifier bound to this runtime's gateway and retry policy
    pub fn classifier(&self) -> ResponseClassifier {
        ResponseClassifier::new(
            self.gateway.clone(),
            self.settings.retry.clone(),
            self.cancel.clone(),
            self.logger("classifier"),
        )
    }

    /// Generator bound to this runtime's gateway and settings
    pub fn generator(&self) -> ContentGenerator {
        ContentGenerator::new(
            self.gateway.clone(),
            self.settings.retry.clone(),
            self.settings.format.clone(),
            self.cancel.clone(),
            self.logger("generator"),
        )
    }

    /// Render a prompt: character override or `default`, plus an optional footer
    pub fn compose_prompt(
        &self,
        name: &str,
        default: &str,
        footer: Option<&str>,
        state: &State,
    ) -> Result<String> {
        let template = resolve_template(&self.character, name, default);
        match footer {
            Some(footer) => compose_prompt_from_state(state, &with_footer(template, footer)),
            None => compose_prompt_from_state(state, template),
        }
    }

    /// Build prompt state from the persona, recent room history and `extra`
    pub async fn compose_state(&self, memory: Option<&Memory>, extra: State) -> Result<State> {
        let mut state = self.persona_state();

        if let Some(memory) = memory {
            let recent = self
                .store
                .get_recent_memories(memory.room_id, RECENT_MESSAGE_COUNT)
                .await?;
            state.set_value("recentMessages", self.format_memories(&recent));
            state.set_value("roomId", memory.room_id.to_string());
        }

        state.merge(extra);
        Ok(state)
    }

    /// Persona values; list fields are randomly sampled per call
    pub fn persona_state(&self) -> State {
        let character = &self.character;
        let mut rng = rand::thread_rng();
        let mut state = State::new()
            .with_value("agentName", character.name.clone())
            .with_value("bio", sample(&character.bio, 3, &mut rng).join(" "))
            .with_value("lore", sample(&character.lore, 10, &mut rng).join("\n"))
            .with_value(
                "topic",
                character.topics.choose(&mut rng).cloned().unwrap_or_default(),
            )
            .with_value(
                "adjective",
                character
                    .adjectives
                    .choose(&mut rng)
                    .cloned()
                    .unwrap_or_default(),
            );

        if !character.topics.is_empty() {
            state.set_value(
                "topics",
                format!(
                    "{} is interested in {}",
                    character.name,
                    sample(&character.topics, 5, &mut rng).join(", ")
                ),
            );
        }
        state.set_value(
            "postDirections",
            directions(&character.name, "Post", &character.style.all, &character.style.post),
        );
        state.set_value(
            "messageDirections",
            directions(&character.name, "Message", &character.style.all, &character.style.chat),
        );
        if !character.post_examples.is_empty() {
            state.set_value(
                "characterPostExamples",
                format!(
                    "# Example Posts for {}\n{}",
                    character.name,
                    sample(&character.post_examples, 10, &mut rng).join("\n")
                ),
            );
        }
        if !character.message_examples.is_empty() {
            state.set_value(
                "characterMessageExamples",
                format_message_examples(&character.name, &character.message_examples),
            );
        }
        state
    }

    /// Render memories as `Name: text` lines, oldest first
    pub fn format_memories(&self, memories: &[Memory]) -> String {
        if memories.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = memories
            .iter()
            .filter(|m| m.content.has_text())
            .map(|m| {
                let speaker = if m.user_id == self.agent_id {
                    self.character.name.clone()
                } else {
                    m.content
                        .metadata
                        .get("userName")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("user-{}", &m.user_id.to_string()[..8]))
                };
                format!("{}: {}", speaker, m.content.text)
            })
            .collect();
        format!("# Conversation Messages\n{}", lines.join("\n"))
    }
}

fn sample<R: rand::Rng>(items: &[String], max: usize, rng: &mut R) -> Vec<String> {
    let mut picked: Vec<String> = items.to_vec();
    picked.shuffle(rng);
    picked.truncate(max);
    picked
}

fn directions(name: &str, kind: &str, all: &[String], specific: &[String]) -> String {
    let lines: Vec<&str> = all.iter().chain(specific).map(String::as_str).collect();
    if lines.is_empty() {
        return String::new();
    }
    format!("# {} Directions for {}\n{}", kind, name, lines.join("\n"))
}

fn format_message_examples(agent_name: &str, examples: &[Vec<MessageExample>]) -> String {
    let conversations: Vec<String> = examples
        .iter()
        .map(|conversation| {
            conversation
                .iter()
                .map(|line| {
                    format!(
                        "{}: {}",
                        line.user.replace("{{agentName}}", agent_name),
                        line.content.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();
    format!(
        "# Example Conversations for {}\n{}",
        agent_name,
        conversations.join("\n\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_test_runtime, ScriptedProvider};
    use crate::utils::now_millis;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_agent_id_derived_from_name() {
        let (runtime, _) = create_test_runtime(Arc::new(ScriptedProvider::default()));
        assert_eq!(runtime.agent_id, string_to_uuid("Rop"));
    }

    #[tokio::test]
    async fn test_compose_state_includes_persona_and_history() {
        let (runtime, store) = create_test_runtime(Arc::new(ScriptedProvider::default()));
        let room = Uuid::new_v4();
        let mut inbound = Memory::new(
            Uuid::new_v4(),
            runtime.agent_id,
            Uuid::new_v4(),
            room,
            Content::text("wen moon"),
            now_millis(),
        );
        inbound
            .content
            .metadata
            .insert("userName".into(), serde_json::json!("alice"));
        store.create_memory(&inbound).await.unwrap();

        let state = runtime
            .compose_state(Some(&inbound), State::new().with_value("currentPost", "p"))
            .await
            .unwrap();

        assert_eq!(state.get_value("agentName").unwrap(), "Rop");
        assert_eq!(state.get_value("bio").unwrap(), "terminally online");
        assert_eq!(state.get_value("currentPost").unwrap(), "p");
        assert!(state
            .get_value("recentMessages")
            .unwrap()
            .contains("alice: wen moon"));
        assert!(state
            .get_value("characterPostExamples")
            .unwrap()
            .contains("gas fees"));
    }

    #[tokio::test]
    async fn test_compose_state_propagates_store_errors() {
        let mut store = crate::memory_store::MockMemoryStore::new();
        store
            .expect_get_recent_memories()
            .returning(|_, _| Err(crate::ParleyError::database("locked")));
        let runtime = AgentRuntime::new(RuntimeOpts {
            agent_id: None,
            character: crate::testing::test_character(),
            settings: crate::testing::test_settings(),
            gateway: Arc::new(CompletionGateway::new(
                ModelProviderName::OpenAi,
                Logger::new("test"),
            )),
            store: Arc::new(store),
            logger: Logger::new("test"),
        });
        let memory = Memory::new(
            Uuid::new_v4(),
            runtime.agent_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Content::text("gm"),
            now_millis(),
        );

        let err = runtime
            .compose_state(Some(&memory), State::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::ParleyError::Database(_)));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_token() {
        let (runtime, _) = create_test_runtime(Arc::new(ScriptedProvider::default()));
        let token = runtime.cancel_token();
        assert!(!token.is_cancelled());
        runtime.shutdown();
        assert!(token.is_cancelled());
    }
}
