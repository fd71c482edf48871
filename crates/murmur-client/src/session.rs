use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::audio::{AudioSource, WavFileSource};
use crate::config::ClientConfig;
use crate::{conversation, table};

#[cfg(not(feature = "microphone"))]
const DEFAULT_RECORDING: &str = "voice_message.wav";

/// An interactive console session for one logged-in user.
pub struct Session {
    config: ClientConfig,
    api: ApiClient,
    user_id: i64,
    input: Lines<BufReader<Stdin>>,
}

impl Session {
    /// Resolve our own identity by username, creating it on first use.
    pub async fn start(config: ClientConfig) -> Result<Self> {
        let api = ApiClient::new(&config);

        let user_id = match api.find_user_id(&config.username).await? {
            Some(id) => id,
            None => {
                println!("User not found. Creating new user.");
                match api.create_user(&config.username).await {
                    Ok(user) => user.id,
                    // Someone registered the name between our lookup and create
                    Err(e) => api
                        .find_user_id(&config.username)
                        .await?
                        .with_context(|| format!("Failed to create user: {}", e))?,
                }
            }
        };
        info!("Logged in as {} ({})", config.username, user_id);

        Ok(Self {
            config,
            api,
            user_id,
            input: BufReader::new(tokio::io::stdin()).lines(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        clear_screen();
        println!("Welcome to Murmur!");
        println!("Logged in as {}", self.config.username);
        if self.config.debug {
            println!("Debug mode is ON");
        }
        debug!("Voice recordings last {}s", self.config.record_seconds);

        loop {
            self.print_menu();
            let choice = self.prompt("Enter your choice (1-5): ").await?;

            let outcome = match choice.as_str() {
                "1" => self.send_text_message().await,
                "2" => self.send_voice_message().await,
                "3" => self.view_messages().await,
                "4" => self.list_users().await,
                "5" => {
                    println!("Thank you for using Murmur. Goodbye!");
                    return Ok(());
                }
                _ => {
                    println!("Invalid choice. Please try again.");
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                warn!("Menu action failed: {:#}", e);
                println!("Error: {:#}", e);
            }

            self.prompt("\nPress Enter to continue...").await?;
            clear_screen();
        }
    }

    fn print_menu(&self) {
        println!("\n--- Murmur Menu (Logged in as {}) ---", self.config.username);
        println!("1. Send Text Message");
        println!("2. Send Voice Message");
        println!("3. View Messages");
        println!("4. List Users");
        println!("5. Exit");
    }

    async fn send_text_message(&mut self) -> Result<()> {
        let recipient = self.prompt("Enter recipient's username: ").await?;
        let content = self.prompt("Enter your message: ").await?;

        let recipient_id = self.resolve(&recipient).await?;
        self.api.send_text(self.user_id, recipient_id, &content).await?;
        println!("Message sent successfully!");
        Ok(())
    }

    async fn send_voice_message(&mut self) -> Result<()> {
        let recipient = self.prompt("Enter recipient's username: ").await?;
        let recipient_id = self.resolve(&recipient).await?;

        let source = self.choose_source().await?;
        let audio = tokio::task::spawn_blocking(move || source.capture()).await??;

        let message = self.api.send_voice(self.user_id, recipient_id, audio).await?;
        println!("Voice message sent!");
        println!(
            "Transcription: {}",
            message.transcription.as_deref().unwrap_or("(none)")
        );
        Ok(())
    }

    #[cfg(feature = "microphone")]
    async fn choose_source(&mut self) -> Result<Box<dyn AudioSource>> {
        let seconds = self.config.record_seconds;
        let path = self
            .prompt(&format!(
                "Press Enter to record {}s from the microphone, or enter a WAV path: ",
                seconds
            ))
            .await?;
        if path.is_empty() {
            println!("Recording...");
            let duration = std::time::Duration::from_secs(seconds);
            return Ok(Box::new(crate::audio::MicrophoneSource::new(duration)));
        }
        Ok(Box::new(WavFileSource::new(path)))
    }

    #[cfg(not(feature = "microphone"))]
    async fn choose_source(&mut self) -> Result<Box<dyn AudioSource>> {
        let path = self
            .prompt(&format!("Path to WAV recording [{}]: ", DEFAULT_RECORDING))
            .await?;
        let path = if path.is_empty() { DEFAULT_RECORDING.to_string() } else { path };
        Ok(Box::new(WavFileSource::new(path)))
    }

    async fn view_messages(&mut self) -> Result<()> {
        let other = self.prompt("Enter username to view messages with: ").await?;
        let other_id = self.resolve(&other).await?;

        let (texts, voices, users) = tokio::try_join!(
            self.api.text_conversation(self.user_id, other_id),
            self.api.voice_conversation(self.user_id, other_id),
            self.api.list_users(),
        )?;

        let entries = conversation::merge(texts, voices);
        let rows = conversation::rows(&entries, &users);
        println!("{}", table::render(&["Timestamp", "Sender", "Content"], &rows));
        Ok(())
    }

    async fn list_users(&mut self) -> Result<()> {
        let rows: Vec<Vec<String>> = self
            .api
            .list_users()
            .await?
            .into_iter()
            .map(|u| vec![u.id.to_string(), u.username])
            .collect();
        println!("{}", table::render(&["ID", "Username"], &rows));
        Ok(())
    }

    async fn resolve(&self, username: &str) -> Result<i64> {
        match self.api.find_user_id(username).await? {
            Some(id) => Ok(id),
            None => bail!("User {:?} not found", username),
        }
    }

    async fn prompt(&mut self, label: &str) -> Result<String> {
        use std::io::Write;

        print!("{}", label);
        std::io::stdout().flush()?;

        match self.input.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => bail!("stdin closed"),
        }
    }
}

fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
}
