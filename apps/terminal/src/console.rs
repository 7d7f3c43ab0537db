//! Console front-end: line commands in, text out.
//!
//! ```text
//!   page <n>            buy <id>           qty <n>
//!   card | cash | event pick <n>           tap <token>
//!   yes | no            cell <1-9>         cancel
//!   topup <amount>      admin [pin]        restock <id> <qty>
//!   exit                quit               help
//! ```

use kasse_core::wager::{Board, Mark, Outcome};
use kasse_core::Money;

use crate::flow::{IdentityPurpose, Input, Kiosk, Notice, Screen};
use crate::payment::{PaymentError, PaymentKind, Payer, WagerSettlement};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Simulated token tap; goes to the identity reader, not the kiosk.
    Tap(String),
    Input(Input),
    Help,
    Empty,
}

pub const HELP: &str = "\
Commands:
  page <n>             show catalog page
  buy <id>             choose a product
  qty <n>              choose the quantity
  card | cash | event  choose the payment method
  pick <n>             choose an event account
  tap <token>          present an identity token
  yes | no             accept or decline the wager
  cell <1-9>           place a mark
  cancel               back to the catalog
  topup <amount>       credit an account
  admin [pin]          enter admin mode (token when no pin)
  restock <id> <qty>   add stock (admin)
  exit                 leave admin mode
  quit                 stop the terminal (admin)";

/// Parses one console line.
pub fn parse_line(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(Command::Empty);
    };
    let rest: Vec<&str> = words.collect();

    let input = match (head.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("help" | "?", _) => return Ok(Command::Help),
        ("tap", [token]) => return Ok(Command::Tap(token.to_string())),
        ("page", [n]) => Input::ShowPage(number(n)?),
        ("buy", [id]) => Input::ChooseProduct(number(id)?),
        ("qty", [n]) => Input::Quantity(number(n)?),
        ("card", []) => Input::Method(PaymentKind::Card),
        ("cash", []) => Input::Method(PaymentKind::Cash),
        ("event", []) => Input::Method(PaymentKind::Event),
        ("pick", [n]) => Input::ChooseEvent(index(n)?),
        ("yes", []) => Input::AcceptWager,
        ("no", []) => Input::DeclineWager,
        ("cell", [n]) => {
            let cell = index(n)?;
            if !(1..=9).contains(&cell) {
                return Err("cell must be 1-9".to_string());
            }
            Input::Cell(cell - 1)
        }
        ("cancel", []) => Input::Cancel,
        ("topup", [amount]) => Input::Topup(parse_amount(amount)?),
        ("admin", []) => Input::AdminToken,
        ("admin", [pin]) => Input::AdminPin(pin.to_string()),
        ("restock", [id, qty]) => Input::Restock {
            product_id: number(id)?,
            quantity: number(qty)?,
        },
        ("exit", []) => Input::LeaveAdmin,
        ("quit", []) => Input::Shutdown,
        _ => return Err(format!("Unknown command: {} (try help)", line.trim())),
    };
    Ok(Command::Input(input))
}

fn number(word: &str) -> Result<i64, String> {
    word.parse().map_err(|_| format!("not a number: {}", word))
}

fn index(word: &str) -> Result<usize, String> {
    word.parse().map_err(|_| format!("not a number: {}", word))
}

/// Parses `5`, `5.5`, `5.50` or `5,50` into minor units.
pub fn parse_amount(word: &str) -> Result<Money, String> {
    let invalid = || format!("not an amount: {}", word);
    let normalized = word.replace(',', ".");
    let (whole, frac) = match normalized.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (normalized.as_str(), ""),
    };

    if whole.is_empty() || frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };

    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .map(Money::from_cents)
        .ok_or_else(invalid)
}

// =============================================================================
// Rendering
// =============================================================================

/// Text for the current screen.
pub fn render_screen(kiosk: &Kiosk, symbol: &str) -> String {
    match kiosk.screen() {
        Screen::Catalog { page } => {
            let mut out = format!("== Page {} of {:?} ==\n", page, kiosk.pages());
            let products = kiosk.page_products();
            if products.is_empty() {
                out.push_str("  (nothing on this page)\n");
            }
            for p in products {
                let flag = if p.stock <= 0 { "  sold out?" } else { "" };
                out.push_str(&format!(
                    "  [{}] {:<20} {:>10}{}\n",
                    p.id,
                    p.name,
                    p.price().display_with(symbol),
                    flag
                ));
            }
            out.push_str("buy <id>");
            out
        }
        Screen::Quantity { product } => format!("{}: how many? qty <1-10>", product.name),
        Screen::Method { product, quantity } => format!(
            "{} x {} = {}: card, cash or event?",
            quantity,
            product.name,
            product
                .price()
                .checked_times(*quantity)
                .unwrap_or(Money::zero())
                .display_with(symbol)
        ),
        Screen::EventChoice { choices, .. } => {
            let mut out = String::from("Event accounts:\n");
            for (i, account) in choices.iter().enumerate() {
                out.push_str(&format!("  ({}) {}\n", i + 1, account.name));
            }
            out.push_str("pick <n>");
            out
        }
        Screen::AwaitIdentity { purpose, .. } => match purpose {
            IdentityPurpose::Purchase { .. } => "Tap your card".to_string(),
            IdentityPurpose::TopupAuthorization { .. } => "Tap the top-up card".to_string(),
            IdentityPurpose::TopupRecipient { amount } => {
                format!("Tap the card to credit with {}", amount.display_with(symbol))
            }
            IdentityPurpose::AdminLogin => "Tap an admin card".to_string(),
        },
        Screen::WagerOffer { stake, .. } => format!(
            "Double or nothing on {}? yes / no",
            stake.total.display_with(symbol)
        ),
        Screen::WagerPlaying { game, .. } => format!("{}\ncell <1-9>", render_board(game.board())),
        Screen::Admin => "ADMIN: restock <id> <qty>, topup <amount>, exit, quit".to_string(),
    }
}

/// Text for one notice.
pub fn render_notice(notice: &Notice, symbol: &str) -> String {
    let m = |money: &Money| money.display_with(symbol);
    match notice {
        Notice::Purchased(p) => {
            let who = match &p.payer {
                Payer::Account { name, .. } => name.as_str(),
                Payer::Cash => "cash",
            };
            match p.balance {
                Some(balance) => format!(
                    "Thanks {}! {} x {} for {}. Balance {}",
                    who,
                    p.quantity,
                    p.product_name,
                    m(&p.total),
                    m(&balance)
                ),
                None => format!("Please pay {} in cash for {} x {}", m(&p.total), p.quantity, p.product_name),
            }
        }
        Notice::PaymentFailed(e) => match e {
            PaymentError::IdentityUnreadable => "No card read. Cancelled.".to_string(),
            PaymentError::UnknownCredential => "Card not accepted.".to_string(),
            PaymentError::InsufficientFunds { balance, total } => {
                format!("Limit reached: balance {}, needed {}", m(balance), m(total))
            }
            PaymentError::Storage(reason) => try_again(reason),
            other => format!("Could not complete: {}", other),
        },
        Notice::TapCard { total } => format!("Total {}. Tap your card.", m(total)),
        Notice::TapAuthorization => "Tap the top-up card.".to_string(),
        Notice::TapRecipient { amount } => format!("Tap the card to credit with {}.", m(amount)),
        Notice::TapAdmin => "Tap an admin card.".to_string(),
        Notice::NoEventAccounts => "No event accounts available.".to_string(),
        Notice::WagerOffered { total, seconds } => {
            format!("Double or nothing on {}? {}s to decide.", m(total), seconds)
        }
        Notice::WagerBoard { board } => render_board(board),
        Notice::WagerFinished {
            outcome,
            board,
            settlement,
        } => {
            let verdict = match outcome {
                Outcome::Win => "You win!",
                Outcome::Lose => "House wins.",
                Outcome::Draw => "Draw.",
            };
            let effect = match settlement {
                WagerSettlement::Refunded { balance } => format!("Refunded, balance {}", m(balance)),
                WagerSettlement::CashForgiven { total } => format!("Keep your {}", m(total)),
                WagerSettlement::Charged { balance } => format!("Charged again, balance {}", m(balance)),
                WagerSettlement::ChargeDeclined { total } => {
                    format!("Second charge of {} exceeds the limit", m(total))
                }
                WagerSettlement::CashExtraDue { total } => format!("Please pay another {}", m(total)),
                WagerSettlement::NoEffect => "Nothing changes".to_string(),
                WagerSettlement::Failed { reason } => format!("Settlement failed: {}", reason),
            };
            format!("{}\n{} {}", render_board(board), verdict, effect)
        }
        Notice::WagerDeclined => "No wager.".to_string(),
        Notice::WagerExpired => "Wager timed out. Nothing changes.".to_string(),
        Notice::ToppedUp { name, amount, balance } => {
            format!("{} credited with {}. Balance {}", name, m(amount), m(balance))
        }
        Notice::AdminEntered => "Admin mode.".to_string(),
        Notice::AdminLeft => "Left admin mode.".to_string(),
        Notice::AccessDenied => "Access denied.".to_string(),
        Notice::Restocked { product_id, stock } => format!("Product {} now at {}", product_id, stock),
        Notice::Cancelled => "Cancelled.".to_string(),
        Notice::InvalidInput(reason) => format!("? {}", reason),
        Notice::TryAgain(reason) => try_again(reason),
        Notice::ShuttingDown => "Shutting down.".to_string(),
    }
}

/// Renders the board with 1-9 on free cells.
pub fn render_board(board: &Board) -> String {
    let mut rows = Vec::with_capacity(3);
    for row in 0..3 {
        let cells: Vec<String> = (0..3)
            .map(|col| {
                let cell = row * 3 + col;
                match board.get(cell) {
                    Some(Mark::Patron) => "X".to_string(),
                    Some(Mark::House) => "O".to_string(),
                    None => (cell + 1).to_string(),
                }
            })
            .collect();
        rows.push(format!(" {} ", cells.join(" | ")));
    }
    rows.join("\n---+---+---\n")
}

fn try_again(reason: &str) -> String {
    format!("Please try again ({})", reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("  "), Ok(Command::Empty));
        assert_eq!(parse_line("tap TESTCARD123"), Ok(Command::Tap("TESTCARD123".into())));
        assert_eq!(parse_line("BUY 3"), Ok(Command::Input(Input::ChooseProduct(3))));
        assert_eq!(parse_line("cell 9"), Ok(Command::Input(Input::Cell(8))));
        assert_eq!(parse_line("admin"), Ok(Command::Input(Input::AdminToken)));
        assert_eq!(parse_line("admin 1234"), Ok(Command::Input(Input::AdminPin("1234".into()))));
        assert_eq!(
            parse_line("restock 2 12"),
            Ok(Command::Input(Input::Restock { product_id: 2, quantity: 12 }))
        );
        assert!(parse_line("cell 0").is_err());
        assert!(parse_line("buy cola").is_err());
        assert!(parse_line("dance").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("5"), Ok(Money::from_cents(500)));
        assert_eq!(parse_amount("5.5"), Ok(Money::from_cents(550)));
        assert_eq!(parse_amount("5,05"), Ok(Money::from_cents(505)));
        assert!(parse_amount("5.555").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount(".5").is_err());
    }

    #[test]
    fn test_storage_failures_render_as_try_again() {
        let failed = Notice::PaymentFailed(PaymentError::Storage("database is locked".into()));
        assert_eq!(render_notice(&failed, "€"), "Please try again (database is locked)");
        assert_eq!(
            render_notice(&Notice::TryAgain("database is locked".into()), "€"),
            render_notice(&failed, "€")
        );
        assert_eq!(
            render_notice(&Notice::PaymentFailed(PaymentError::UnknownCredential), "€"),
            "Card not accepted."
        );
    }

    #[test]
    fn test_render_board() {
        let board = Board::from_picture("X.. .O. ...");
        let text = render_board(&board);
        assert!(text.starts_with(" X | 2 | 3 "));
        assert!(text.contains(" 4 | O | 6 "));
    }
}
