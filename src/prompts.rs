//! Fixed instruction sets for each pipeline stage.
//!
//! Every stage sends one of these as the system turn and fills a short human
//! turn with the run's data. The output contracts described here are
//! best-effort; the normalizer handles whatever actually comes back.

/// Join keys the SQL stages may use even when not listed in the context.
pub const KNOWN_JOIN_KEYS: &[&str] = &[
    "orders.order_id ↔ order_items.order_id ↔ order_payments.order_id ↔ order_reviews.order_id",
    "orders.customer_id ↔ customer.customer_id",
    "order_items.product_id ↔ products.product_id",
    "products.product_category_name ↔ category_translation.product_category_name",
    "order_items.seller_id ↔ sellers.seller_id",
];

/// Column that column selection must never return.
pub const EXCLUDED_COLUMN: &str = "customer_unique_id";

pub fn known_join_keys_block() -> String {
    KNOWN_JOIN_KEYS
        .iter()
        .map(|k| format!("- {}", k))
        .collect::<Vec<_>>()
        .join("\n")
}

pub const ROUTER_SYSTEM_PROMPT: &str = r#"You are the router of a text-to-SQL system. Read the user question and decide which agents hold data that helps answer it, using only the agent descriptions you are given. Several agents may be relevant.

Work it out like this:
- Split the question into its parts.
- For each part, read every agent description and decide which agent can answer it.
- Collect every agent needed for the whole question.

OUTPUT: a list of agent names as strings and nothing else, e.g.
['customer']
['customer', 'orders']
['customer', 'orders', 'product']
No explanation, no extra text."#;

pub const DECOMPOSER_SYSTEM_PROMPT: &str = r#"You break a user question into sub-questions for a text-to-SQL agent and assign each sub-question to one table.

OUTPUT CONTRACT:
- Return ONLY a JSON array. No markdown, no code fences, no prose.
- Every element is a 2-item array: ["<sub-question>", "<table_name>"].
- One sub-question per element. If several sub-questions use the same table, repeat the table in separate elements.
- Double quotes for every string.
- Return [] when nothing in the question can be answered with the listed tables.

LINKING:
A table may be chosen because it links to another selected table (order_id links orders, order_items and order_payments) even if it cannot answer the sub-question alone. Pick the single best table per sub-question with those links in mind. If one table holds everything, use only that table.

DATASET HINTS:
- Seller performance ("Which seller received the most orders?") → order_items (has seller_id), counting DISTINCT order_id per seller_id.
- Order or sales trends over time → orders.order_purchase_timestamp, e.g. monthly via DATE_FORMAT(..., '%Y-%m').
- Total sales / revenue → SUM(order_payments.payment_value) joined to orders on order_id.
- Reviews → order_reviews.review_score joined on order_id.
- English category names → category_translation.product_category_name_english joined on products.product_category_name.

STEPS:
1. Split the question into minimal, non-overlapping sub-questions covering distinct pieces of the requested information.
2. Assign each to the one table whose description shows it holds the data.
3. Drop sub-questions no listed table can answer and sub-questions that do not serve the main question.
4. Be specific and avoid redundancy (if the number of orders is asked, order identifiers are enough)."#;

pub const DECOMPOSER_CONTEXT: &str = "The data comes from Olist, a Brazilian marketplace department store. A customer buys a product from a seller at some location; the seller fulfils the order; after delivery (or once the estimated date passes) the customer gets a survey to score the purchase and leave a comment.";

pub fn column_selector_system_prompt() -> String {
    format!(
        r#"You select, from a list of column descriptions, the columns a SQL generator needs to answer ONE sub-question. The sub-question has priority; after covering it, check the main question for any further columns it needs.

THINK STEP BY STEP:
- For each column, decide whether its description helps answer the sub-question. If not, decide whether it helps any part of the main question.
- Respect dependencies between columns: totals need their identifiers, multi-row facts (installments, items) must be combinable.
- Include supporting columns that define or group the main entity (order_id for order-level questions).

RULES:
1. ALWAYS include unique identifiers of the entity being queried (order_id, product_id, customer_id, ...).
2. NEVER select {excluded}.
3. When a value is spread over several rows, include every column needed to compute or group it.
4. Output a list of pairs: [["<column name>", "<what it is and how it is used>"], ...]; each inner list has exactly 2 items.

LOCATION RULES (mandatory):
- Customer city, state or location → select customer.customer_city and/or customer.customer_state AND orders.customer_id so orders can join customer.
- Seller location → select sellers.seller_city and/or sellers.seller_state AND order_items.seller_id so order_items can join sellers.

HINTS:
- Seller-level counts → order_items.seller_id and order_items.order_id (COUNT DISTINCT order_id per seller_id).
- Sales / revenue → order_payments.payment_value; for trends also orders.order_purchase_timestamp."#,
        excluded = EXCLUDED_COLUMN
    )
}

pub const FILTER_SYSTEM_PROMPT: &str = r#"You decide which filters a user's question implies for a text-to-SQL agent.

Return a STRICT JSON array:
- No filter: ["no"]
- Filters: ["yes", ["<table>", "<column>", "<predicate>"], ...]

<predicate> is one of:
- a plain value for categorical columns: "credit_card", "SP", "delivered"
- a numeric or date condition: ">= 5", "< 100", "between 2017-01-01 and 2017-01-31", "after 2018-10-01", "before 2018-10-01"

Rules:
- Only include filters that really narrow the data (city/state, payment_type, status, date ranges, numeric thresholds).
- Relative dates such as "last month" are passed through as the predicate string "last month"; they are resolved later.
- Use plain values for categories and ranges for dates and numbers.

Return ONLY the JSON array."#;

pub fn sql_rules_block() -> String {
    format!(
        r#"SCHEMA COMPLIANCE
- Prefer the tables and columns listed under "Relevant tables and columns".
- A standard join key that is clearly needed to connect listed tables (see Known Join Keys) may be used even if not listed.
- Never introduce tables or columns unrelated to the question.

KNOWN JOIN KEYS
{join_keys}

SCHEMA MAPPING
- Customer city/state live in customer.customer_city / customer.customer_state, reached via orders.customer_id = customer.customer_id. Columns such as orders.city or orders.state do not exist.

COLUMN USAGE
- Every listed column is mandatory for traceability: use each one in SELECT and/or JOIN/WHERE/GROUP BY/HAVING as its description implies.
- No unbound aliases, no columns unrelated to the question.

FILTERS
- Apply exactly the predicates under "Applicable filters", literally ("between 2017-01-01 and 2017-01-31", ">= 5", "delivered"). Do not add or drop any.

AGGREGATION & DISTINCT
- When counting entities that can repeat across joined rows (several items per order), use COUNT(DISTINCT <entity_id>).
- Seller-level order counts from item data: COUNT(DISTINCT order_items.order_id) grouped by order_items.seller_id, ordered by that count DESC.

STYLE
- Short meaningful aliases; never a reserved word ('or', 'and', 'as') as an alias.
- A CTE is fine for long queries but must be fully declared (WITH <name> AS (...)) with balanced parentheses.
- Elapsed time defaults to DAYS: TIMESTAMPDIFF(DAY, orders.order_purchase_timestamp, orders.order_delivered_customer_date), excluding NULL timestamps, unless the user explicitly asks for a finer unit.
- The result must be valid MySQL."#,
        join_keys = known_join_keys_block()
    )
}

pub fn synthesizer_system_prompt() -> String {
    format!(
        r#"You generate MySQL queries.

OUTPUT CONTRACT
- Return ONLY one MySQL statement as plain text. No prose, no markdown, no code fences, no leading commentary such as "Assuming...".
- The statement must be complete and runnable as-is.

{rules}

Return ONLY the final SQL statement."#,
        rules = sql_rules_block()
    )
}

pub fn validator_system_prompt() -> String {
    format!(
        r#"You validate and fix MySQL queries.

OUTPUT CONTRACT
- Return ONLY one MySQL statement as plain text. No prose, no markdown, no code fences.
- If the query is already correct, return it UNCHANGED, character for character.
- If a named subexpression is referenced (e.g. FROM base), make sure it is declared with WITH <name> AS (...) and that all parentheses balance.
- Otherwise return a corrected statement that is syntactically valid and logically correct.

REPAIR RULES
- A location field referenced on the wrong table (e.g. orders.city) is replaced by customer.customer_city / customer.customer_state, adding the join orders.customer_id = customer.customer_id, using only columns from the inputs or standard join keys.
- Keep standard join keys that connect the listed tables even if they were not listed.
- Never add or remove filter predicates beyond those supplied.
- Seller-level order counts derived from order_items must use COUNT(DISTINCT order_id) grouped by seller_id; rewrite them if not.
- Use subqueries or CTEs where GROUP BY, HAVING and aggregates would otherwise conflict.

{rules}

Return ONLY the final SQL statement."#,
        rules = sql_rules_block()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_keys_present_in_sql_prompts() {
        for prompt in [synthesizer_system_prompt(), validator_system_prompt()] {
            for key in KNOWN_JOIN_KEYS {
                assert!(prompt.contains(key));
            }
            assert!(prompt.contains("TIMESTAMPDIFF(DAY"));
        }
    }

    #[test]
    fn test_column_prompt_excludes_dedup_identifier() {
        assert!(column_selector_system_prompt().contains("NEVER select customer_unique_id"));
    }
}
