use serde::Serialize;

use archiparse::job::Job;
use archiparse::model::{Element, Model, Page};

use crate::error::CliError;

pub(crate) fn json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn job_line(job: &Job) {
    let mut line = format!(
        "{}  {:<15} {:>3}%  {}",
        job.id,
        job.status.label(),
        job.progress(),
        job.filename
    );
    if let Some(error) = &job.error_message {
        line.push_str(&format!("  ({})", error));
    }
    println!("{}", line);
}

pub(crate) fn jobs(page: &Page<Job>) {
    for job in &page.items {
        job_line(job);
    }
    footer(page);
}

pub(crate) fn models(models: &[Model]) {
    for model in models {
        println!(
            "{}  {:<30} elements={} storeys={} spaces={}",
            model.id,
            model.name.as_deref().unwrap_or("-"),
            model.statistics.elements,
            model.statistics.storeys,
            model.statistics.spaces
        );
    }
}

pub(crate) fn elements(page: &Page<Element>) {
    for element in &page.items {
        println!(
            "{}  {:<24} {:<24} {}",
            element.id,
            element.ifc_type,
            element.guid,
            element.name.as_deref().unwrap_or("-")
        );
    }
    footer(page);
}

fn footer<T>(page: &Page<T>) {
    println!(
        "-- page {} ({} per page), {} total{}",
        page.page,
        page.page_size,
        page.total,
        if page.is_last() { "" } else { ", more available" }
    );
}
