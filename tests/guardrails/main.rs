mod helpers;
mod test_orchestrator;
mod test_task;
mod test_whylabs_client;
