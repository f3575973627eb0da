use std::path::PathBuf;

use bledom_driver::*;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::Result;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Device address; scans for the first supported device when omitted
    #[arg(short, long)]
    address: Option<String>,

    /// Seconds of idle before disconnecting (0 keeps the link up)
    #[arg(long, default_value_t = 120)]
    disconnect_delay: u64,

    /// Path for the persisted status-query detection cache
    #[arg(long)]
    cache: Option<PathBuf>,

    /// How brightness is applied (auto, rgb, native)
    #[arg(long, default_value = "auto")]
    brightness_mode: BrightnessMode,

    /// Per-channel RGB calibration gains, e.g. "1.0,0.88,0.38"
    #[arg(long)]
    gains: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum, Debug)]
enum EffectType {
    /// Crossfade through red, green, blue, yellow, cyan, magenta, white
    Rainbow,
    /// Jump between red, green, blue
    Jump,
    /// Jump through red, green, blue, yellow, cyan, magenta, white
    JumpAll,
    /// Crossfade red
    CrossfadeRed,
    /// Crossfade green
    CrossfadeGreen,
    /// Crossfade blue
    CrossfadeBlue,
    /// Crossfade through red, green, blue
    CrossfadeRgb,
    /// Blink through red, green, blue, yellow, cyan, magenta, white
    Blink,
    /// Blink red
    BlinkRed,
    /// Blink green
    BlinkGreen,
    /// Blink blue
    BlinkBlue,
}

#[derive(Clone, ValueEnum, Debug)]
enum MicMode {
    Energic,
    Rhythm,
    Spectrum,
    Rolling,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn LED strip on
    On,
    /// Turn LED strip off
    Off,
    /// Set custom RGB color
    Color {
        /// Red value (0-255)
        #[arg(short, long, default_value_t = 255)]
        red: u8,
        /// Green value (0-255)
        #[arg(short, long, default_value_t = 255)]
        green: u8,
        /// Blue value (0-255)
        #[arg(short, long, default_value_t = 255)]
        blue: u8,
    },
    /// Set white channel intensity
    White {
        /// Intensity (0-255)
        #[arg(short, long, default_value_t = 255)]
        intensity: u8,
    },
    /// Set brightness
    Brightness {
        /// Brightness level (0-255)
        #[arg(short, long, default_value_t = 255)]
        level: u8,
    },
    /// Set color temperature
    ColorTemp {
        /// Color temperature in Kelvin (1800-7000)
        #[arg(short, long, default_value_t = 4000)]
        kelvin: u32,
        /// Brightness level (0-255)
        #[arg(short, long)]
        brightness: Option<u8>,
    },
    /// Set effect
    Effect {
        /// Effect type (available options shown in description)
        #[arg(short, long, value_enum, default_value_t = EffectType::Rainbow)]
        effect_type: EffectType,
        /// Effect speed (0-255)
        #[arg(short, long, default_value_t = 128)]
        speed: u8,
    },
    /// Enable microphone reactivity with a mode
    MicOn {
        /// Microphone-reactive mode
        #[arg(short, long, value_enum, default_value_t = MicMode::Rhythm)]
        mode: MicMode,
        /// Sensitivity (0-100)
        #[arg(short, long, default_value_t = 50)]
        sensitivity: u8,
    },
    /// Disable microphone reactivity
    MicOff,
    /// Schedule to turn on
    ScheduleOn {
        /// Hour (0-23)
        #[arg(long, default_value_t = 8)]
        hour: u8,
        /// Minute (0-59)
        #[arg(short, long, default_value_t = 30)]
        minute: u8,
        /// Days (mon,tue,wed,thu,fri,sat,sun,all,weekdays,weekend)
        #[arg(short, long, default_value = "weekdays")]
        days: String,
    },
    /// Schedule to turn off
    ScheduleOff {
        /// Hour (0-23)
        #[arg(long, default_value_t = 23)]
        hour: u8,
        /// Minute (0-59)
        #[arg(short, long, default_value_t = 45)]
        minute: u8,
        /// Days (mon,tue,wed,thu,fri,sat,sun,all,weekdays,weekend)
        #[arg(short, long, default_value = "weekdays")]
        days: String,
    },
    /// Synchronize the strip's clock with the local time
    SyncTime,
    /// Connect, poll once and print the observed state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("bledom_driver=info,bledomctl=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let found = match &cli.address {
        Some(address) => discover::find_by_address(address).await,
        None => discover::find_supported().await,
    };
    let found = match found {
        Ok(found) => found,
        Err(e) => {
            error!("Failed to find device: {e}");
            return Err(e.into());
        }
    };
    info!("Using device {} ({})", found.name, found.address);

    let mut session = DeviceSession::new(found, session_config(&cli));
    if let Some(gains) = cli.gains.as_deref().and_then(parse_gains) {
        session.set_rgb_gains(gains.r, gains.g, gains.b);
    }

    match cli.command.unwrap_or(Commands::Status) {
        Commands::On => {
            session.turn_on().await?;
        }
        Commands::Off => {
            session.turn_off().await?;
        }
        Commands::Color { red, green, blue } => {
            session.turn_on().await?;
            session.set_color(red, green, blue).await?;
        }
        Commands::White { intensity } => {
            session.turn_on().await?;
            session.set_white(intensity).await?;
        }
        Commands::Brightness { level } => {
            // Brightness changes are only visible while the strip is on
            session.turn_on().await?;
            session.set_brightness(level).await?;
        }
        Commands::ColorTemp { kelvin, brightness } => {
            session.turn_on().await?;
            session.set_color_temp_kelvin(kelvin, brightness).await?;
        }
        Commands::Effect { effect_type, speed } => {
            session.turn_on().await?;

            let effect_code = match effect_type {
                EffectType::Rainbow => EFFECTS.crossfade_red_green_blue_yellow_cyan_magenta_white,
                EffectType::Jump => EFFECTS.jump_red_green_blue,
                EffectType::JumpAll => EFFECTS.jump_red_green_blue_yellow_cyan_magenta_white,
                EffectType::CrossfadeRed => EFFECTS.crossfade_red,
                EffectType::CrossfadeGreen => EFFECTS.crossfade_green,
                EffectType::CrossfadeBlue => EFFECTS.crossfade_blue,
                EffectType::CrossfadeRgb => EFFECTS.crossfade_red_green_blue,
                EffectType::Blink => EFFECTS.blink_red_green_blue_yellow_cyan_magenta_white,
                EffectType::BlinkRed => EFFECTS.blink_red,
                EffectType::BlinkGreen => EFFECTS.blink_green,
                EffectType::BlinkBlue => EFFECTS.blink_blue,
            };

            debug!("Using effect code: {effect_code:#04x}");
            session.set_effect(effect_code).await?;
            session.set_effect_speed(speed).await?;
        }
        Commands::MicOn { mode, sensitivity } => {
            session.turn_on().await?;
            session.enable_mic().await?;
            let mic_code = match mode {
                MicMode::Energic => MIC_EFFECTS.energic,
                MicMode::Rhythm => MIC_EFFECTS.rhythm,
                MicMode::Spectrum => MIC_EFFECTS.spectrum,
                MicMode::Rolling => MIC_EFFECTS.rolling,
            };
            session.set_mic_effect(mic_code).await?;
            session.set_mic_sensitivity(sensitivity).await?;
        }
        Commands::MicOff => {
            session.disable_mic().await?;
        }
        Commands::ScheduleOn { hour, minute, days } => {
            let days_value = schedule::parse_days(&days);
            debug!("Days value: {days_value:#04x}");
            session.set_scheduler_on(days_value, hour, minute, true).await?;
        }
        Commands::ScheduleOff { hour, minute, days } => {
            let days_value = schedule::parse_days(&days);
            debug!("Days value: {days_value:#04x}");
            session.set_scheduler_off(days_value, hour, minute, true).await?;
        }
        Commands::SyncTime => {
            session.sync_time().await?;
        }
        Commands::Status => {
            session.update().await;
            print_status(&session);
        }
    }

    session.stop().await;
    Ok(())
}

fn session_config(cli: &Cli) -> SessionConfig {
    SessionConfig {
        disconnect_delay_secs: cli.disconnect_delay,
        cache_path: cli.cache.clone(),
        rgb_gains: None,
        brightness_mode: cli.brightness_mode,
    }
}

/// Parses a "r,g,b" gain triple
fn parse_gains(spec: &str) -> Option<RgbGains> {
    let mut parts = spec.split(',').map(|p| p.trim().parse::<f32>());
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(Ok(r)), Some(Ok(g)), Some(Ok(b)), None) => RgbGains::new(r, g, b),
        _ => {
            error!("Invalid gains '{spec}', expected three comma-separated numbers");
            None
        }
    }
}

fn print_status(session: &DeviceSession) {
    println!("Device:      {} ({})", session.name(), session.address());
    println!("Model:       {}", session.model().config().name);
    match session.is_on() {
        Some(true) => println!("Power:       on"),
        Some(false) => println!("Power:       off"),
        None => println!("Power:       unknown"),
    }
    if let Some((r, g, b)) = session.rgb_color() {
        println!("Color:       rgb({r}, {g}, {b})");
    }
    println!("Brightness:  {}", session.brightness());
    if let Some(kelvin) = session.color_temp_kelvin() {
        println!(
            "Color temp:  {kelvin}K ({}-{}K)",
            session.min_color_temp_kelvin(),
            session.max_color_temp_kelvin()
        );
    }
    if let Some(rssi) = session.rssi() {
        println!("RSSI:        {rssi} dBm");
    }
}
