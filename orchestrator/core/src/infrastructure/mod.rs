// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the HiveMind core

pub mod broker;
pub mod communication;
pub mod config_loader;
pub mod event_observer;
pub mod event_sink;
pub mod memory_broker;

pub use broker::{
    Backoff, BrokerError, ConsumeOptions, Delivery, DeliveryTag, MessageBroker, PublishOptions,
    QueueOptions, INPUT_QUEUE, RESULT_QUEUE, TASK_QUEUE,
};
pub use communication::{
    ChannelClient, ClientStatus, CommunicationClient, CommunicationError, Message, MessageHandler,
    MessageHub,
};
pub use config_loader::{
    AgentConfig, AgentsConfig, ConfigError, PlatformConfig, PlatformSettings, TaskConfig,
    TasksConfig, ToolConfig, ToolsConfig,
};
pub use event_observer::{EventObserver, ObserverConfig};
pub use event_sink::{EventSink, InMemoryEventSink, PostgresEventSink};
pub use memory_broker::{InMemoryBroker, QueueStats};
