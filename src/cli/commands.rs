use std::fmt::Write as _;
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args};
use time::{Date, OffsetDateTime};
use unicode_width::UnicodeWidthStr;

use super::{parse_date_arg, Session};
use crate::catalog::{self, ListOptions, SortDirection, SortField, SortSpec};
use crate::expiry::{expiry_date_from_shelf_life, shelf_life_days, ExpiryStatus, Freshness};
use crate::highlight::{build_highlight_regex, mark_matches};
use crate::model::{format_date, Item};
use crate::reminder::{pending_reminders, Reminder, ReminderEvent, ReminderScheduler};
use crate::search::{SearchField, SearchFields};

#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("expiry").required(true).args(["expires", "shelf_life"])))]
pub struct AddArgs {
    /// Item name (prompted if omitted)
    #[arg()]
    pub name: Option<String>,
    /// Category label, e.g. Dairy
    #[arg(long, short)]
    pub category: String,
    /// Purchase date (YYYY-MM-DD); defaults to today
    #[arg(long, value_parser = parse_date_arg)]
    pub purchased: Option<Date>,
    /// Expiry date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date_arg)]
    pub expires: Option<Date>,
    /// Days from purchase until expiry, instead of --expires
    #[arg(long, allow_hyphen_values = true)]
    pub shelf_life: Option<i64>,
    /// Free-text note. If omitted, read from stdin when piped.
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Item identifier
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, short)]
    pub category: Option<String>,
    #[arg(long, value_parser = parse_date_arg)]
    pub purchased: Option<Date>,
    #[arg(long, value_parser = parse_date_arg, conflicts_with = "shelf_life")]
    pub expires: Option<Date>,
    /// Recompute the expiry date from the purchase date
    #[arg(long, allow_hyphen_values = true)]
    pub shelf_life: Option<i64>,
    #[arg(long, conflicts_with = "clear_note")]
    pub note: Option<String>,
    /// Drop the existing note
    #[arg(long)]
    pub clear_note: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Item identifier
    pub id: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only show items in this category (exact match)
    #[arg(long, short)]
    pub category: Option<String>,
    /// Sort key (defaults to the configured sort)
    #[arg(long, value_enum)]
    pub sort: Option<SortField>,
    /// Reverse the sort order
    #[arg(long)]
    pub desc: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Text to look for; matched as one case-insensitive substring
    #[arg()]
    pub query: Vec<String>,
    /// Restrict matching to these fields (repeatable)
    #[arg(long = "field", value_enum)]
    pub fields: Vec<SearchField>,
    /// Limit the number of results printed
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct RemindArgs {
    /// Keep running and re-check on an interval
    #[arg(long)]
    pub watch: bool,
    /// Seconds between checks in watch mode (defaults to the configured interval)
    #[arg(long)]
    pub interval: Option<u64>,
}

pub fn add_item(session: &Session, mut args: AddArgs) -> Result<()> {
    if args.name.is_none() {
        args.name = Some(prompt("Name")?);
    }
    if args.note.is_none() {
        args.note = read_stdin()?;
    }
    print!("{}", run_add(session, args)?);
    Ok(())
}

fn run_add(session: &Session, args: AddArgs) -> Result<String> {
    let name = args.name.unwrap_or_default();
    if name.trim().is_empty() {
        bail!("item name cannot be empty");
    }
    let today = session.today();
    let purchase = args.purchased.unwrap_or(today);
    let expiry = resolve_expiry(purchase, args.expires, args.shelf_life)?;
    let item = Item::new(
        name,
        args.category,
        purchase,
        expiry,
        args.note,
        OffsetDateTime::now_utc(),
    );
    session
        .repo
        .create(item.clone())
        .context("saving new item")?;
    let freshness = Freshness::assess(item.expiry_date, today);
    Ok(format!(
        "Added {} [{}] ({}, {})\n",
        item.name,
        item.id,
        format_date(item.expiry_date),
        freshness.describe()
    ))
}

fn resolve_expiry(purchase: Date, expires: Option<Date>, shelf_life: Option<i64>) -> Result<Date> {
    match (expires, shelf_life) {
        (Some(date), _) => Ok(date),
        (None, Some(days)) => {
            expiry_date_from_shelf_life(purchase, days).context("computing expiry date")
        }
        (None, None) => bail!("provide either --expires or --shelf-life"),
    }
}

pub fn edit_item(session: &Session, args: EditArgs) -> Result<()> {
    print!("{}", run_edit(session, args)?);
    Ok(())
}

fn run_edit(session: &Session, args: EditArgs) -> Result<String> {
    let Some(mut item) = session.repo.get_by_id(&args.id).context("loading item")? else {
        bail!("item '{}' not found", args.id);
    };
    if let Some(name) = args.name {
        item.name = name.trim().to_owned();
    }
    if let Some(category) = args.category {
        item.category = category.trim().to_owned();
    }
    if let Some(purchased) = args.purchased {
        item.purchase_date = purchased;
    }
    if args.expires.is_some() || args.shelf_life.is_some() {
        item.expiry_date = resolve_expiry(item.purchase_date, args.expires, args.shelf_life)?;
    }
    if args.clear_note {
        item.note = None;
    } else if let Some(note) = args.note {
        item.note = Some(note);
    }

    session
        .repo
        .update(item)
        .with_context(|| format!("updating item '{}'", args.id))?;
    let stored = session
        .repo
        .get_by_id(&args.id)
        .context("re-reading updated item")?
        .with_context(|| format!("item '{}' disappeared during update", args.id))?;
    Ok(format!("Updated {} [{}]\n", stored.name, stored.id))
}

pub fn remove_item(session: &Session, args: IdArgs) -> Result<()> {
    print!("{}", run_remove(session, &args.id)?);
    Ok(())
}

fn run_remove(session: &Session, id: &str) -> Result<String> {
    let Some(item) = session.repo.get_by_id(id).context("loading item")? else {
        bail!("item '{id}' not found");
    };
    session
        .repo
        .remove(id)
        .with_context(|| format!("removing item '{id}'"))?;
    Ok(format!("Removed {} [{}]\n", item.name, item.id))
}

pub fn show_item(session: &Session, args: IdArgs) -> Result<()> {
    let Some(item) = session.repo.get_by_id(&args.id).context("loading item")? else {
        bail!("item '{}' not found", args.id);
    };
    print!("{}", format_details(&item, session.today()));
    Ok(())
}

fn format_details(item: &Item, today: Date) -> String {
    let freshness = Freshness::assess(item.expiry_date, today);
    let mut out = String::new();
    let _ = writeln!(&mut out, "{} [{}]", item.name, item.id);
    let _ = writeln!(&mut out, "    category   {}", item.category);
    let _ = writeln!(&mut out, "    purchased  {}", format_date(item.purchase_date));
    let _ = writeln!(&mut out, "    expires    {}", format_date(item.expiry_date));
    let _ = writeln!(
        &mut out,
        "    shelf life {} days",
        shelf_life_days(item.purchase_date, item.expiry_date)
    );
    let _ = writeln!(
        &mut out,
        "    status     {} ({})",
        freshness.status,
        freshness.describe()
    );
    if let Some(note) = item.note() {
        let _ = writeln!(&mut out, "    note       {note}");
    }
    out
}

pub fn list_items(session: &Session, args: ListArgs) -> Result<()> {
    print!("{}", run_list(session, &args)?);
    Ok(())
}

fn run_list(session: &Session, args: &ListArgs) -> Result<String> {
    let default_sort = session.config.list.default_sort;
    let options = ListOptions {
        category: args.category.clone(),
        sort: SortSpec {
            field: args.sort.unwrap_or(default_sort.field),
            direction: if args.desc {
                SortDirection::Descending
            } else if args.sort.is_some() {
                SortDirection::Ascending
            } else {
                default_sort.direction
            },
        },
    };
    let items = catalog::list_items(&*session.repo, &options).context("listing items")?;
    Ok(format_table(&items, session.today()))
}

fn format_table(items: &[Item], today: Date) -> String {
    if items.is_empty() {
        return "No items.\n".to_string();
    }
    let rows: Vec<[String; 6]> = items
        .iter()
        .map(|item| {
            let freshness = Freshness::assess(item.expiry_date, today);
            [
                status_label(freshness.status).to_string(),
                format_date(item.expiry_date),
                freshness.days_until.to_string(),
                item.name.clone(),
                item.category.clone(),
                item.id.clone(),
            ]
        })
        .collect();
    let header = ["STATUS", "EXPIRES", "DAYS", "NAME", "CATEGORY", "ID"];
    let mut widths = header.map(|title| title.width());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.width());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &header.map(str::to_owned), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let line = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, width)| pad(cell, *width))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}

fn status_label(status: ExpiryStatus) -> &'static str {
    match status {
        ExpiryStatus::Normal => "ok",
        ExpiryStatus::Warning => "SOON",
        ExpiryStatus::Expired => "EXPIRED",
    }
}

pub fn search_items(session: &Session, args: SearchArgs) -> Result<()> {
    print!("{}", run_search(session, &args)?);
    Ok(())
}

fn run_search(session: &Session, args: &SearchArgs) -> Result<String> {
    let query = args.query.join(" ");
    let fields = if args.fields.is_empty() {
        session.config.search.fields()
    } else {
        SearchFields::from_fields(&args.fields)
    };
    let limit = args.limit.unwrap_or(session.config.search.max_results);
    let mut results = session
        .repo
        .search(&query, fields)
        .context("executing search")?;
    results.truncate(limit);
    Ok(format_search_results(&results, &query, fields, session.today()))
}

fn format_search_results(
    items: &[Item],
    query: &str,
    fields: SearchFields,
    today: Date,
) -> String {
    let Some(regex) = build_highlight_regex(query) else {
        return "No matches found.\n".to_string();
    };
    if items.is_empty() {
        return "No matches found.\n".to_string();
    }
    let mark = |text: &str, field: SearchFields| {
        if fields.contains(field) {
            mark_matches(text, &regex)
        } else {
            text.to_string()
        }
    };
    let mut out = String::new();
    for item in items {
        let freshness = Freshness::assess(item.expiry_date, today);
        let _ = writeln!(
            &mut out,
            "{}  ({})  [{}]",
            mark(&item.name, SearchFields::NAME),
            mark(&item.category, SearchFields::CATEGORY),
            item.id
        );
        let _ = writeln!(
            &mut out,
            "    {} {}, {}",
            freshness.status,
            format_date(item.expiry_date),
            freshness.describe()
        );
        if let Some(note) = item.note() {
            let _ = writeln!(&mut out, "    note: {}", mark(note, SearchFields::NOTE));
        }
    }
    out
}

pub fn list_categories(session: &Session) -> Result<()> {
    print!("{}", run_categories(session)?);
    Ok(())
}

fn run_categories(session: &Session) -> Result<String> {
    let categories =
        catalog::distinct_categories(&*session.repo).context("collecting categories")?;
    if categories.is_empty() {
        return Ok("(no categories)\n".to_string());
    }
    let mut out = String::new();
    for category in categories {
        let _ = writeln!(&mut out, "{category}");
    }
    Ok(out)
}

pub fn remind(session: &Session, args: RemindArgs) -> Result<()> {
    if !args.watch {
        let reminders =
            pending_reminders(&*session.repo, session.today()).context("checking reminders")?;
        print!("{}", format_reminders(&reminders));
        return Ok(());
    }

    let interval = args
        .interval
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| session.config.reminders.interval());
    if interval.is_zero() {
        bail!("reminder interval must be at least one second");
    }
    let scheduler = ReminderScheduler::new(
        Arc::clone(&session.repo),
        Arc::clone(&session.clock),
        interval,
    );
    let handle = scheduler.start()?;
    for event in handle.events().iter() {
        match event {
            ReminderEvent::Due {
                checked_on,
                reminders,
            } => {
                println!("-- {} --", format_date(checked_on));
                print!("{}", format_reminders(&reminders));
            }
            ReminderEvent::Failed { message } => {
                eprintln!("reminder check failed: {message}");
            }
        }
    }
    handle.stop();
    Ok(())
}

fn format_reminders(reminders: &[Reminder]) -> String {
    if reminders.is_empty() {
        return "Nothing is expiring soon.\n".to_string();
    }
    let mut out = String::new();
    for reminder in reminders {
        let tag = match reminder.freshness.status {
            ExpiryStatus::Expired => "EXPIRED",
            _ => "SOON",
        };
        let _ = writeln!(
            &mut out,
            "[{tag}] {} ({}): {}",
            reminder.item.name,
            reminder.item.category,
            reminder.freshness.describe()
        );
        if let Some(note) = reminder.item.note() {
            let _ = writeln!(&mut out, "    note: {note}");
        }
    }
    out
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    let trimmed = buf.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_owned()))
}
